pub mod captcha;
pub mod handlers;
pub mod session;
pub mod users;
