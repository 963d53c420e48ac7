use crate::{
    config::FoxConfig,
    error::FoxResult,
    terminal::open_port,
    utils::{
        line_printer::{AutoResponder, LinePrinter},
        ring_buf_queue::{write_queue, WriteDrains},
        sync_flag::new_sync_flag,
    },
};
use std::{fs::create_dir_all, sync::mpsc::channel, time::Duration};
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tracing::{info, warn};

pub mod file_logger_thread;
pub mod serial_console_thread;
pub mod user_console;

use file_logger_thread::FileLoggerThread;
use serial_console_thread::SerialConsoleThread;
use user_console::{history_path, user_console_task, UserConsoleWriter};

pub const BUFFER_SIZE: usize = 0x1000;
pub const SERIAL_CONSOLE_THREAD_PRIORITY: u8 = 1;
pub const USER_CONSOLE_THREAD_PRIORITY: u8 = 2;
pub const FILE_LOGGER_THREAD_PRIORITY: u8 = 3;
const CONSOLE_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Best effort: unprivileged users usually may not raise priorities.
pub fn set_thread_priority(priority: u8) {
    let value = match priority.try_into() {
        Ok(value) => value,
        Err(e) => return warn!("bad thread priority {}: {:?}", priority, e),
    };
    if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        warn!("set_current_thread_priority({}) => {:?}", priority, e);
    }
}

/// Interactive terminal on the configured port, with a transcript on disk.
pub fn console_task(cfg: &FoxConfig) -> FoxResult<()> {
    let console = &cfg.console;
    let port = open_port(&cfg.serial.port_name, cfg.serial.baud_rate, CONSOLE_READ_TIMEOUT)?;
    create_dir_all(&console.log_dir)?;

    let (console_victim, console_assassin) = new_sync_flag();
    let (line_sender, line_receiver) = channel();
    let file_logger_thread = FileLoggerThread::spawn(
        &console.log_dir,
        &console.project_name,
        line_receiver,
        console_assassin.clone(),
    )?;

    let (user_queue, user_drain) = write_queue::<BUFFER_SIZE>();
    let (reply_queue, reply_drain) = write_queue::<BUFFER_SIZE>();
    let read_printer = LinePrinter::new("r".to_string(), console.line_width, line_sender.clone())
        .with_responder(AutoResponder::new(console.auto_replies.clone(), reply_queue));
    let serial_console_thread = SerialConsoleThread::<BUFFER_SIZE>::spawn(
        port,
        read_printer,
        WriteDrains::new(vec![user_drain, reply_drain]),
        console_assassin,
    )?;

    let mut writer = UserConsoleWriter::new(
        history_path(&console.log_dir, &console.project_name),
        &cfg.serial.port_name,
        &console.line_ending,
        LinePrinter::new("w".to_string(), console.line_width, line_sender).quiet(),
        user_queue,
    );
    set_thread_priority(USER_CONSOLE_THREAD_PRIORITY);
    let user_res = user_console_task(console_victim, &mut writer);

    let serial_res = serial_console_thread.join();
    let logger_res = file_logger_thread.join();
    writer.save_history();
    info!("console end");
    user_res.and(serial_res).and(logger_res)
}
