use crate::{
    error::{FoxError, FoxResult},
    utils::sync_flag::{new_sync_flag, SyncFlagAssassin, SyncFlagVictim},
};
use chrono::Local;
use std::{
    fs::{create_dir_all, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc::{Receiver, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{error, info};

use super::{set_thread_priority, FILE_LOGGER_THREAD_PRIORITY};

pub fn log_file_path(log_dir: &Path, project_name: &str) -> PathBuf {
    let file_name = format!("{}_{}.log", project_name, Local::now().format("%y%m%d_%H%M%S"));
    log_dir.join(file_name)
}

/// Writes every transcript line it receives; syncs once the channel goes quiet.
pub struct FileLoggerThread {
    assassin: SyncFlagAssassin,
    path: PathBuf,
    join_handle: JoinHandle<FoxResult<()>>,
}

impl FileLoggerThread {
    pub fn spawn(
        log_dir: &Path,
        project_name: &str,
        line_receiver: Receiver<String>,
        console_assassin: SyncFlagAssassin,
    ) -> FoxResult<Self> {
        create_dir_all(log_dir)?;
        let path = log_file_path(log_dir, project_name);
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(opened_file) => {
                info!("transcript at {:?}", path);
                opened_file
            }
            Err(e) => {
                error!("could not open transcript {:?}: {}", path, e);
                return Err(FoxError::Io(e));
            }
        };

        let (victim, assassin) = new_sync_flag();
        let join_handle = thread::Builder::new()
            .name("file-logger".to_string())
            .spawn(move || {
                set_thread_priority(FILE_LOGGER_THREAD_PRIORITY);
                file_logger_task(victim, file, line_receiver, console_assassin)
            })?;
        Ok(Self {
            assassin,
            path,
            join_handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(self) -> FoxResult<()> {
        self.assassin.kill_victim();
        self.join_handle
            .join()
            .map_err(|_| FoxError::Local("file logger thread panicked".to_string()))?
    }
}

fn file_logger_task(
    victim: SyncFlagVictim,
    mut file: File,
    line_receiver: Receiver<String>,
    console_assassin: SyncFlagAssassin,
) -> FoxResult<()> {
    let mut synced = true;
    let poll = Duration::from_millis(100);
    loop {
        match line_receiver.recv_timeout(poll) {
            Ok(mut line) => {
                line.push('\n');
                if let Err(e) = file.write_all(line.as_bytes()) {
                    error!("transcript write error {}", e);
                    console_assassin.kill_victim();
                    return Err(FoxError::Io(e));
                }
                synced = false;
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                file.sync_all()?;
                break;
            }
            Err(RecvTimeoutError::Timeout) if !synced => {
                if let Err(e) = file.sync_all() {
                    error!("transcript sync error {}", e);
                    console_assassin.kill_victim();
                    return Err(FoxError::Io(e));
                }
                synced = true;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        // drain what is queued before honouring the stop flag
        if !victim.is_alive() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::sync_flag::new_sync_flag;
    use std::{fs, sync::mpsc::channel};

    #[test]
    fn lines_reach_the_file() {
        let dir = std::env::temp_dir().join(format!("foxconsole-logger-{}", std::process::id()));
        let (tx, rx) = channel();
        let (_console_victim, console_assassin) = new_sync_flag();
        let logger = FileLoggerThread::spawn(&dir, "bench", rx, console_assassin).unwrap();
        let path = logger.path().to_path_buf();
        tx.send("r 00:00.000 | hello".to_string()).unwrap();
        tx.send("w 00:00.001 | ls".to_string()).unwrap();
        thread::sleep(Duration::from_millis(300));
        logger.join().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "r 00:00.000 | hello\nw 00:00.001 | ls\n");
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("bench_"));
        let _ = fs::remove_dir_all(dir);
    }
}
