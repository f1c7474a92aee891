use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use tokio::sync::mpsc;
use tracing::{debug, info};

use lampi_common::{config, BrokerConfig, LampStateDelta, UiConfig, CLIENT_UI};

use crate::buttons::ButtonReader;
use crate::engine::{UiAction, UiEngine};
use crate::session::{self, SessionConfig};

/// Display-brightness sink accepting an integer duty level.
pub trait BacklightOutput {
    fn apply(&mut self, level: u8);
}

// Hardware integration point:
// replace with the PWM duty write on the backlight pin (GPIO 18).
struct LogBacklight {
    last: Option<u8>,
}

impl BacklightOutput for LogBacklight {
    fn apply(&mut self, level: u8) {
        if self.last != Some(level) {
            debug!("backlight level {level}");
            self.last = Some(level);
        }
    }
}

// Hardware integration point:
// replace with pull-up GPIO reads (17 and 22) on the device.
struct NullButtons;

impl ButtonReader for NullButtons {
    fn read(&mut self) -> (bool, bool) {
        (false, false)
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut ui_config = UiConfig::default();
    ui_config.sanitize();
    let device_id = config::device_id();

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let session = session::start(
        SessionConfig {
            client_id: CLIENT_UI.to_string(),
            device_id: device_id.clone(),
            broker: BrokerConfig::from_env(),
        },
        event_tx,
    )?;

    // UI toolkit integration point:
    // widget callbacks clone `intent_tx` and send partial state deltas.
    let (intent_tx, mut intent_rx) = mpsc::channel::<LampStateDelta>(16);
    let _intent_tx = intent_tx;

    let mut engine = UiEngine::new(CLIENT_UI, &ui_config);
    let mut backlight = LogBacklight { last: None };
    let mut buttons = NullButtons;
    let mut poll = tokio::time::interval(Duration::from_millis(ui_config.button_poll_interval_ms));

    info!("lamp ui started, device {device_id}");

    // Start bright with the idle chain armed.
    for action in engine.on_physical_activity(monotonic_ms()) {
        execute_action(&session, &mut backlight, &device_id, action).await;
    }

    // The scheduler: every mutation of core state happens on this task.
    // Transport callbacks only reach it through `event_rx`.
    loop {
        let actions = tokio::select! {
            maybe_event = event_rx.recv() => match maybe_event {
                Some(event) => engine.handle_remote(event, monotonic_ms()),
                None => break,
            },
            Some(delta) = intent_rx.recv() => {
                engine.submit_local_intent(delta, monotonic_ms());
                Vec::new()
            }
            _ = poll.tick() => {
                let (network, notification) = buttons.read();
                engine.poll_buttons(network, notification, monotonic_ms())
            }
            () = sleep_until(engine.next_deadline()) => engine.tick(monotonic_ms()),
        };

        for action in actions {
            execute_action(&session, &mut backlight, &device_id, action).await;
        }
    }

    Ok(())
}

async fn execute_action(
    session: &session::Session,
    backlight: &mut dyn BacklightOutput,
    device_id: &str,
    action: UiAction,
) {
    match action {
        UiAction::PublishState(snapshot) => session.publish_state(&snapshot).await,
        UiAction::ApplyBacklight(level) => backlight.apply(level),
        // Presentation layer hooks: the widget toolkit refreshes from these
        // without re-entering submit_local_intent.
        UiAction::LampStateChanged(state) => {
            info!(
                "lamp state: h={:.2} s={:.2} b={:.2} on={}",
                state.hue, state.saturation, state.brightness, state.on
            );
        }
        UiAction::ShowAssociationCode(code) => {
            info!("associate this lamp on the web with code {code}");
        }
        UiAction::ClearAssociationCode => info!("lamp associated"),
        UiAction::ShowNotification { title, message } => {
            info!("notification: {title}: {message}");
        }
        UiAction::DismissNotification => info!("notification dismissed"),
        UiAction::ShowNetworkStatus => info!("network status: device {device_id}"),
        UiAction::HideNetworkStatus => info!("network status closed"),
    }
}

async fn sleep_until(deadline_ms: Option<u64>) {
    match deadline_ms {
        Some(deadline) => {
            let wait = deadline.saturating_sub(monotonic_ms());
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        None => std::future::pending().await,
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
