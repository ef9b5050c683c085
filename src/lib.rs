//! Network and persistence core of an XMDS digital signage player.
pub mod config;
/// Device identity and content-decoding primitives.
///
/// RSA keys identify the display to the CMS, base64 carries binary material
/// through XML, and `legacy` holds the RC4 path older servers still need.
pub mod crypto;
pub mod error;
pub mod services;
/// Typed SOAP RPC over transport sessions.
pub mod soap;
/// Playback statistics: records, their local queue and the upload pass.
pub mod stats;
pub mod system;
/// Client-side HTTP(S) transport.
///
/// One `HttpSession` carries one request/response exchange through a fixed
/// sequence of stages. Errors always name the stage that failed.
pub mod transport;
/// XMDS client: the CMS operations a display performs.
pub mod xmds;
pub mod xml;

pub use error::PlayerError;
