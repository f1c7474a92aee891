use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use lampi_common::color;

/// Devices with no real owner are parked on this one.
pub const PARKED_OWNER: &str = "parked_device_user";

pub fn generate_association_code() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LampRecord {
    pub device_id: String,
    pub name: String,
    pub owner: String,
    pub association_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorbellRecord {
    pub device_id: String,
    pub name: String,
    pub owner: String,
    pub association_code: String,
    pub created_at: DateTime<Utc>,
}

/// Doorbell-to-lamp wiring: which lamps ring for a doorbell, and the flash
/// color/count the notification carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorbellLink {
    pub doorbell_id: String,
    pub lamp_id: String,
    pub hue: f32,
    pub saturation: f32,
    pub brightness: f32,
    pub num_flashes: u8,
}

impl DoorbellLink {
    pub fn hex_color(&self) -> String {
        color::hex_color(self.hue, self.saturation, self.brightness)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub lamps: Vec<LampRecord>,
    pub doorbells: Vec<DoorbellRecord>,
    pub links: Vec<DoorbellLink>,
}

impl Registry {
    pub fn lamp(&self, device_id: &str) -> Option<&LampRecord> {
        self.lamps.iter().find(|lamp| lamp.device_id == device_id)
    }

    pub fn doorbell(&self, device_id: &str) -> Option<&DoorbellRecord> {
        self.doorbells
            .iter()
            .find(|doorbell| doorbell.device_id == device_id)
    }

    /// First contact from an unknown device creates its parked record with a
    /// fresh association code.
    pub fn get_or_create_lamp(&mut self, device_id: &str, now: DateTime<Utc>) -> &LampRecord {
        let index = match self
            .lamps
            .iter()
            .position(|lamp| lamp.device_id == device_id)
        {
            Some(index) => index,
            None => {
                self.lamps.push(LampRecord {
                    device_id: device_id.to_string(),
                    name: "My LAMPI".to_string(),
                    owner: PARKED_OWNER.to_string(),
                    association_code: generate_association_code(),
                    created_at: now,
                });
                self.lamps.len() - 1
            }
        };
        &self.lamps[index]
    }

    pub fn get_or_create_doorbell(
        &mut self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> &DoorbellRecord {
        let index = match self
            .doorbells
            .iter()
            .position(|doorbell| doorbell.device_id == device_id)
        {
            Some(index) => index,
            None => {
                self.doorbells.push(DoorbellRecord {
                    device_id: device_id.to_string(),
                    name: "My Doorbell".to_string(),
                    owner: PARKED_OWNER.to_string(),
                    association_code: generate_association_code(),
                    created_at: now,
                });
                self.doorbells.len() - 1
            }
        };
        &self.doorbells[index]
    }

    /// Claim a parked lamp by association code. The device only displays a
    /// prefix of the full code, so matching is prefix-based; the caller is
    /// responsible for requiring a sane minimum length.
    pub fn associate_lamp(&mut self, code: &str, owner: &str) -> Option<&LampRecord> {
        let record = self
            .lamps
            .iter_mut()
            .find(|lamp| lamp.association_code.starts_with(code) && lamp.owner == PARKED_OWNER)?;
        record.owner = owner.to_string();
        Some(&*record)
    }

    pub fn associate_doorbell(&mut self, code: &str, owner: &str) -> Option<&DoorbellRecord> {
        let record = self.doorbells.iter_mut().find(|doorbell| {
            doorbell.association_code.starts_with(code) && doorbell.owner == PARKED_OWNER
        })?;
        record.owner = owner.to_string();
        Some(&*record)
    }

    /// Park the lamp, regenerate its code, and drop its doorbell wiring.
    pub fn dissociate_lamp(&mut self, device_id: &str) -> Option<&LampRecord> {
        let index = self
            .lamps
            .iter()
            .position(|lamp| lamp.device_id == device_id)?;
        self.links.retain(|link| link.lamp_id != device_id);

        let record = &mut self.lamps[index];
        record.owner = PARKED_OWNER.to_string();
        record.association_code = generate_association_code();
        Some(&self.lamps[index])
    }

    pub fn dissociate_doorbell(&mut self, device_id: &str) -> Option<&DoorbellRecord> {
        let index = self
            .doorbells
            .iter()
            .position(|doorbell| doorbell.device_id == device_id)?;
        self.links.retain(|link| link.doorbell_id != device_id);

        let record = &mut self.doorbells[index];
        record.owner = PARKED_OWNER.to_string();
        record.association_code = generate_association_code();
        Some(&self.doorbells[index])
    }

    /// One link per (doorbell, lamp) pair, newest settings win.
    pub fn upsert_link(&mut self, link: DoorbellLink) {
        self.links
            .retain(|l| !(l.doorbell_id == link.doorbell_id && l.lamp_id == link.lamp_id));
        self.links.push(link);
    }

    pub fn linked_lamps(&self, doorbell_id: &str) -> Vec<(&LampRecord, &DoorbellLink)> {
        self.links
            .iter()
            .filter(|link| link.doorbell_id == doorbell_id)
            .filter_map(|link| self.lamp(&link.lamp_id).map(|lamp| (lamp, link)))
            .collect()
    }
}

#[derive(Clone)]
pub struct Store {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn new() -> Self {
        let data_dir = std::env::var("LAMPI_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.lampi"));

        Self {
            path: Arc::new(data_dir.join("registry.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> anyhow::Result<Registry> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<Registry>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Registry::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, registry: &Registry) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(registry)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}
