pub mod daily;
pub mod history;
pub mod home_screen;
pub mod models;
