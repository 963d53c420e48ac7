//! Driving a Linux target over its serial console: reading until a prompt,
//! logging in, and scraping command output.

pub mod expect;
pub mod link;
pub mod login;
pub mod mock;
pub mod netinfo;

pub use expect::{expect_prompt, send_command, strip_ansi};
pub use link::{open_port, SerialLink};
pub use login::{login, logout, send_reboot, Credentials};
pub use mock::MockLink;
pub use netinfo::{parse_ip_address, target_ip};
