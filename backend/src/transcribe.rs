use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    Text(String),
    NotRecognized,
}

impl Transcription {
    /// Message body for the notification; unrecognized audio gets the fixed
    /// fallback the device shows as-is.
    pub fn into_message(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::NotRecognized => "No Message".to_string(),
        }
    }
}

/// Speech-to-text collaborator mapping a recording to text.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, recording: &Path) -> Transcription;
}

// Integration point: the deployment wires a real recognizer in here.
pub struct NullTranscriber;

impl Transcriber for NullTranscriber {
    fn transcribe(&self, _recording: &Path) -> Transcription {
        Transcription::NotRecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_audio_falls_back_to_no_message() {
        let text = NullTranscriber
            .transcribe(Path::new("/tmp/ring.wav"))
            .into_message();
        assert_eq!(text, "No Message");
    }
}
