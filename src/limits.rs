//! Hard caps on engine inputs. Everything lives in memory, so each cap bounds
//! how much a single client can make the process hold.

pub const MAX_FACILITIES: usize = 10_000;
pub const MAX_BOOKINGS_PER_FACILITY: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_USER_LEN: usize = 256;
pub const MAX_SQL_LEN: usize = 64 * 1024;
