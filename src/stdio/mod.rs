//! Stdio side of the bridge.
//!
//! Everything that touches the MCP server process's byte streams:
//! - `codec`: newline framing with a per-line size limit.
//! - `envelope`: JSON-RPC request/response envelopes and line parsing.
//! - `reader`: stdout task feeding the correlator.
//! - `writer`: stdin task draining the correlator's outbound queue.
//! - `spawner`: process launch behind the [`Launcher`](spawner::Launcher) seam.
//! - `handshake`: the `initialize` / `initialized` exchange.

pub mod codec;
pub mod envelope;
pub mod handshake;
pub mod reader;
pub mod spawner;
pub mod writer;
