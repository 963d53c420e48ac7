pub mod line_printer;
pub mod ring_buf_queue;
pub mod sync_flag;
pub mod user_io;
