//! Utilities for exercising [`framestream`] adapters in tests.
//!
//! [`memory_pair`] provides two connected in-memory framed connections, so an
//! adapter can be driven end to end without sockets:
//!
//! ```rust
//! use framestream::StreamAdapter;
//! use framestream_testing::memory_pair;
//!
//! # async fn example() -> framestream::Result<()> {
//! let (client, server) = memory_pair();
//! let client = StreamAdapter::new(client);
//! let server = StreamAdapter::new(server);
//!
//! client.write(b"ping").await?;
//! let mut buf = [0_u8; 4];
//! let n = server.read(&mut buf).await?;
//! assert_eq!(&buf[..n], b"ping");
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod memory;

pub use logging::{LoggerHandle, logger};
pub use memory::{MemoryConnection, MemoryReader, MemoryWriter, Message, memory_pair};
