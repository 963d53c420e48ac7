use super::{
    expect::{expect_prompt, send_command},
    link::SerialLink,
};
use crate::{
    config::TargetSettings,
    error::{FoxError, FoxResult},
};
use std::{thread, time::Duration};
use tracing::{info, warn};

const WAKE_SETTLE: Duration = Duration::from_millis(500);
const RETRY_SETTLE: Duration = Duration::from_millis(200);
const REBOOT_SETTLE: Duration = Duration::from_millis(500);

/// Username, password and the prompts that frame a login.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub login_prompt: String,
    pub password_prompt: String,
    pub shell_prompts: Vec<String>,
}

impl From<&TargetSettings> for Credentials {
    fn from(target: &TargetSettings) -> Self {
        Self {
            username: target.username.clone(),
            password: target.password.clone(),
            login_prompt: target.login_prompt.clone(),
            password_prompt: target.password_prompt.clone(),
            shell_prompts: target.shell_prompts.clone(),
        }
    }
}

impl Credentials {
    fn login_or_shell(&self) -> Vec<String> {
        let mut prompts = vec![self.login_prompt.clone()];
        prompts.extend(self.shell_prompts.iter().cloned());
        prompts
    }

    fn has_shell(&self, buffer: &str) -> bool {
        self.shell_prompts.iter().any(|p| !p.is_empty() && buffer.contains(p.as_str()))
    }
}

/// Brings the console to a shell prompt, logging in when the target asks for it.
pub fn login<L: SerialLink + ?Sized>(link: &mut L, creds: &Credentials, timeout: Duration) -> FoxResult<()> {
    info!("waking console");
    link.clear_all()?;
    link.send(b"\n")?;
    thread::sleep(WAKE_SETTLE);

    let initial_wait = timeout / 2;
    let wanted = creds.login_or_shell();
    let state = match expect_prompt(link, &wanted, initial_wait, "") {
        Ok(state) => state,
        Err(FoxError::Timeout(_)) => {
            warn!("no prompt yet, nudging console once more");
            link.send(b"\n")?;
            thread::sleep(RETRY_SETTLE);
            expect_prompt(link, &wanted, initial_wait, "")
                .map_err(|e| FoxError::Login(format!("console never showed a prompt: {}", e)))?
        }
        Err(e) => return Err(e),
    };

    if creds.has_shell(&state) {
        info!("already logged in");
        return Ok(());
    }
    if !state.contains(creds.login_prompt.as_str()) {
        return Err(FoxError::Login(format!("unexpected console state {:?}", state)));
    }

    info!("logging in as {}", creds.username);
    link.send(format!("{}\n", creds.username).as_bytes())?;
    expect_prompt(link, &[creds.password_prompt.clone()], timeout, "")
        .map_err(|e| FoxError::Login(format!("no password prompt: {}", e)))?;
    link.send(format!("{}\n", creds.password).as_bytes())?;
    expect_prompt(link, &creds.shell_prompts, timeout, "")
        .map_err(|e| FoxError::Login(format!("no shell after password: {}", e)))?;
    info!("login successful");
    Ok(())
}

/// Ends the shell session. Failures only warn since the port is closed anyway.
pub fn logout<L: SerialLink + ?Sized>(link: &mut L, creds: &Credentials, timeout: Duration) {
    let accepted = creds.login_or_shell();
    match send_command(link, "exit", &accepted, timeout) {
        Ok(_) => info!("logged out"),
        Err(e) => warn!("logout did not confirm: {}", e),
    }
}

/// Fire-and-forget: the target will not print a prompt after this.
pub fn send_reboot<L: SerialLink + ?Sized>(link: &mut L) -> FoxResult<()> {
    info!("sending reboot");
    link.send(b"reboot\n")?;
    thread::sleep(REBOOT_SETTLE);
    Ok(())
}
