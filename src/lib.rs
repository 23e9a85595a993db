pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod playlist;
pub mod render;
pub mod schedule;
pub mod store;
pub mod platform {
    pub mod display_switch;
    pub mod shell;
}
pub mod tasks {
    pub mod orphans;
    pub mod player;
    pub mod render;
    pub mod rescan;
}
