//! Engine configuration

use std::time::Duration;


/// Tunables for [`crate::Engine`].
#[derive( Debug, Clone, PartialEq )]
pub struct EngineConfig {
    /// Volume applied at start-up (0.0 to 1.0)
    pub initial_volume: f32,

    /// Step used by `volume_up` / `volume_down`
    pub volume_step: f32,

    /// How often the completion watcher polls the sink
    pub poll_interval: Duration,

    /// Upper bound on waiting for a superseded watcher to exit
    pub watcher_join_timeout: Duration,

    /// Stop playback when the playing track is removed from the queue
    pub stop_on_remove_current: bool,
}


impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_volume: 0.5,
            volume_step: 0.1,
            poll_interval: Duration::from_millis( 50 ),
            watcher_join_timeout: Duration::from_secs( 2 ),
            stop_on_remove_current: false,
        }
    }
}
