use unison_core::MediaRef;

/// The media player a client drives. Implementations wrap whatever actually
/// renders the media, and are called from the executor's timer tasks.
pub trait LocalPlayer
where
    Self: Send + Sync + 'static,
{
    /// Replaces the loaded media, leaving it paused at the start
    fn load(&self, media_ref: &MediaRef, title: &str);
    fn seek(&self, position_seconds: f64);
    fn play(&self);
    fn pause(&self);
    /// Unloads the media
    fn stop(&self);
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Load(String),
        Seek(f64),
        Play,
        Pause,
        Stop,
    }

    /// Records every call it receives
    #[derive(Debug, Default)]
    pub struct RecordingPlayer {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingPlayer {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().clear();
        }

        /// The position of the last seek
        pub fn last_seek(&self) -> Option<f64> {
            self.calls.lock().iter().rev().find_map(|c| match c {
                Call::Seek(position) => Some(*position),
                _ => None,
            })
        }
    }

    impl LocalPlayer for RecordingPlayer {
        fn load(&self, media_ref: &MediaRef, _title: &str) {
            self.calls.lock().push(Call::Load(media_ref.to_string()));
        }

        fn seek(&self, position_seconds: f64) {
            self.calls.lock().push(Call::Seek(position_seconds));
        }

        fn play(&self) {
            self.calls.lock().push(Call::Play);
        }

        fn pause(&self) {
            self.calls.lock().push(Call::Pause);
        }

        fn stop(&self) {
            self.calls.lock().push(Call::Stop);
        }
    }
}
