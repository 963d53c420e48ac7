use crate::{
    error::FoxResult,
    utils::{line_printer::LinePrinter, ring_buf_queue::WriteQueue, sync_flag::SyncFlagVictim},
};
use rustyline::{error::ReadlineError, Editor};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// User side of the console: rustyline input with per-project history.
pub struct UserConsoleWriter {
    editor: Editor<()>,
    history_path: PathBuf,
    port_name: String,
    line_ending: String,
    line_printer: LinePrinter,
    write_queue: WriteQueue,
}

pub fn history_path(log_dir: &Path, project_name: &str) -> PathBuf {
    log_dir.join(format!("{} history.txt", project_name))
}

/// Line as it goes on the wire.
pub fn terminate_line(line: &str, line_ending: &str) -> String {
    let mut out = line.trim_end_matches(['\r', '\n']).to_string();
    out.push_str(line_ending);
    out
}

impl UserConsoleWriter {
    pub fn new(
        history_path: PathBuf,
        port_name: &str,
        line_ending: &str,
        line_printer: LinePrinter,
        write_queue: WriteQueue,
    ) -> Self {
        let mut editor = Editor::<()>::new();
        if editor.load_history(&history_path).is_err() {
            debug!("no previous history at {:?}", history_path);
        }
        Self {
            editor,
            history_path,
            port_name: port_name.to_string(),
            line_ending: line_ending.to_string(),
            line_printer,
            write_queue,
        }
    }

    pub fn save_history(mut self) {
        if let Err(e) = self.editor.save_history(&self.history_path) {
            debug!("history not saved to {:?}: {}", self.history_path, e);
        }
    }

    fn banner(&self) {
        println!(
            "> [console] talking to {} (Ctrl-C quits, Ctrl-D shows this again)",
            self.port_name
        );
    }
}

pub fn user_console_task(victim: SyncFlagVictim, writer: &mut UserConsoleWriter) -> FoxResult<()> {
    writer.banner();
    while victim.is_alive() {
        match writer.editor.readline("") {
            Ok(line) => {
                writer.editor.add_history_entry(line.as_str());
                let wire = terminate_line(&line, &writer.line_ending);
                writer.write_queue.push(wire.as_bytes());
                writer.line_printer.push_str(&wire);
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => writer.banner(),
            Err(err) => {
                error!("console input error: {}", err);
                return Err(err.into());
            }
        }
    }
    info!("user console end");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_get_the_configured_ending() {
        assert_eq!(terminate_line("ls", "\r\n"), "ls\r\n");
        assert_eq!(terminate_line("ls\n", "\r"), "ls\r");
        assert_eq!(terminate_line("", "\r\n"), "\r\n");
    }

    #[test]
    fn history_lives_next_to_logs() {
        let path = history_path(Path::new("./logs"), "luckfox");
        assert_eq!(path, PathBuf::from("./logs/luckfox history.txt"));
    }
}
