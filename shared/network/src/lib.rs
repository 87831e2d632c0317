mod tcp;

pub use tcp::{Envelope, ResponseSender, ServerEvent, TcpClient, TcpServer};
