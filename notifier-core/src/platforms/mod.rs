pub mod twitch;
pub mod twitch_eventsub;
