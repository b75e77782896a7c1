pub mod crc32;
pub mod define;
pub mod errors;
pub mod packetizer;
pub mod pat;
pub mod pes;
pub mod pmt;
pub mod ts;

pub use errors::{MpegTsError, MpegTsErrorValue};
pub use packetizer::TsPacketizer;
pub use ts::TsMuxer;
