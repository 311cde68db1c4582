use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt::Write;

/// Generate a new entity id: 16 bytes from the OS CSPRNG as lowercase hex.
///
/// No uniqueness check is made against stored data.
///
/// # Panics
/// Panics if the operating system randomness source is unavailable.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    if let Err(err) = OsRng.try_fill_bytes(&mut bytes) {
        panic!("OS randomness source unavailable: {err}");
    }

    let mut id = String::with_capacity(32);
    for byte in bytes {
        let _ = write!(id, "{byte:02x}");
    }
    id
}
