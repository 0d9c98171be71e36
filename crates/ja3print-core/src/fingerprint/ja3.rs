use std::fmt::{self, Write};

use md5::{Digest, Md5};

use crate::error::Ja3Error;
use crate::fingerprint::types::{ClientHelloFields, Ja3Result};

/// Length of the rendered JA3 digest: MD5 as lowercase hex.
pub const JA3_HASH_LEN: usize = 32;

/// Compute the JA3 fingerprint from parsed ClientHello fields.
///
/// JA3 format: MD5(SSLVersion,Ciphers,Extensions,EllipticCurves,EcPointFormats)
///
/// - Fields separated by commas
/// - Values within each field separated by dashes
/// - All values in decimal, in wire order
/// - An absent list still leaves its (empty) field in place
pub fn compute_ja3(fields: &ClientHelloFields) -> Result<Ja3Result, Ja3Error> {
    let raw_string = ja3_string(fields)?;
    let hash = ja3_hash(&raw_string);
    Ok(Ja3Result { hash, raw_string })
}

/// Render the canonical JA3 string.
///
/// The output buffer is reserved up front; a failed reservation surfaces as
/// `Ja3Error::AllocationFailure` instead of aborting.
pub fn ja3_string(fields: &ClientHelloFields) -> Result<String, Ja3Error> {
    let mut out = String::new();
    out.try_reserve_exact(max_string_len(fields))?;

    write!(out, "{},", fields.version)?;
    write_list(&mut out, &fields.ciphers)?;
    out.push(',');
    write_list(&mut out, &fields.extensions)?;
    out.push(',');
    write_list(&mut out, &fields.groups)?;
    out.push(',');
    write_list(&mut out, &fields.point_formats)?;

    Ok(out)
}

/// MD5 of the exact fingerprint bytes, as 32 lowercase hex characters.
pub fn ja3_hash(raw_string: &str) -> String {
    hex::encode(Md5::digest(raw_string.as_bytes()))
}

fn write_list<T: fmt::Display>(out: &mut String, values: &[T]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        write!(out, "{}", v)?;
    }
    Ok(())
}

/// Upper bound of the rendered length: 5 digits + separator per u16,
/// 3 digits + separator per u8, plus the version and four commas.
fn max_string_len(fields: &ClientHelloFields) -> usize {
    let u16_items = fields.ciphers.len() + fields.extensions.len() + fields.groups.len();
    5 + 4 + u16_items * 6 + fields.point_formats.len() * 4
}
