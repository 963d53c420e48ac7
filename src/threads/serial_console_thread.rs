use crate::{
    error::{FoxError, FoxResult},
    terminal::SerialLink,
    utils::{
        line_printer::LinePrinter,
        ring_buf_queue::WriteDrains,
        sync_flag::{new_sync_flag, SyncFlagAssassin, SyncFlagVictim},
    },
};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

use super::{set_thread_priority, SERIAL_CONSOLE_THREAD_PRIORITY};

/// Owns the port: pushes queued writes out and feeds what comes back into the
/// line printer until killed.
pub struct SerialConsoleThread<const SIZE: usize> {
    assassin: SyncFlagAssassin,
    join_handle: JoinHandle<FoxResult<()>>,
}

impl<const SIZE: usize> SerialConsoleThread<SIZE> {
    pub fn spawn<L>(
        link: L,
        line_printer: LinePrinter,
        write_drains: WriteDrains<SIZE>,
        console_assassin: SyncFlagAssassin,
    ) -> FoxResult<Self>
    where
        L: SerialLink + Send + 'static,
    {
        let (victim, assassin) = new_sync_flag();
        let join_handle = thread::Builder::new()
            .name("serial-console".to_string())
            .spawn(move || {
                set_thread_priority(SERIAL_CONSOLE_THREAD_PRIORITY);
                let res = serial_console_task::<SIZE, L>(victim, link, write_drains, line_printer);
                if let Err(e) = &res {
                    error!("serial console stopped: {}", e);
                    console_assassin.kill_victim();
                }
                res
            })?;
        Ok(Self {
            assassin,
            join_handle,
        })
    }

    pub fn join(self) -> FoxResult<()> {
        self.assassin.kill_victim();
        self.join_handle
            .join()
            .map_err(|_| FoxError::Local("serial console thread panicked".to_string()))?
    }
}

fn serial_console_task<const SIZE: usize, L: SerialLink>(
    victim: SyncFlagVictim,
    mut link: L,
    mut write_drains: WriteDrains<SIZE>,
    mut line_printer: LinePrinter,
) -> FoxResult<()> {
    let read_buf = &mut [0u8; SIZE];

    while victim.is_alive() {
        let pending = write_drains.pop_all();
        if !pending.is_empty() {
            link.send(&pending)?;
        }

        let count = link.read_chunk(read_buf)?;
        if count > 0 {
            line_printer.push_bytes(&read_buf[..count]);
        } else {
            // mock links return at once; real ports already waited out their timeout
            thread::yield_now();
        }
    }
    line_printer.flush();
    info!("serial console end");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AutoReply,
        terminal::MockLink,
        utils::{line_printer::AutoResponder, ring_buf_queue::write_queue},
    };
    use std::{sync::mpsc::channel, time::Duration};

    #[test]
    fn writes_go_out_and_replies_come_back() {
        let link = MockLink::new();
        let wire = link.clone();
        link.reply_once("hello", "hello\r\nworld\r\n");

        let (tx, rx) = channel();
        let (mut user_queue, user_drain) = write_queue::<256>();
        let (reply_queue, reply_drain) = write_queue::<256>();
        let printer = LinePrinter::new("r".into(), 80, tx).quiet().with_responder(AutoResponder::new(
            vec![AutoReply {
                trigger: "world".into(),
                reply: "ack\r\n".into(),
            }],
            reply_queue,
        ));
        let (_victim, console_assassin) = new_sync_flag();
        let console = SerialConsoleThread::<256>::spawn(
            link,
            printer,
            WriteDrains::new(vec![user_drain, reply_drain]),
            console_assassin,
        )
        .unwrap();

        user_queue.push(b"hello\r\n");
        thread::sleep(Duration::from_millis(200));
        console.join().unwrap();

        let lines: Vec<String> = rx.try_iter().collect();
        assert!(lines.iter().any(|l| l.ends_with("| world")));
        assert_eq!(wire.sent_text(), "hello\r\nack\r\n");
    }
}
