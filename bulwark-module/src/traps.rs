use crate::error::Error;
use byteorder::{ByteOrder, LittleEndian};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// The kind of trap raised by guest code or by a hostcall trampoline.
///
/// A trampoline whose headroom check fails raises `StackOverflow`, the same code a guest's own
/// stack check raises, so both are reported identically.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum TrapCode {
    StackOverflow = 0,
    IndirectCallToNull = 1,
    BadSignature = 2,
}

impl TrapCode {
    pub fn try_from_u32(code: u32) -> Result<TrapCode, Error> {
        TrapCode::from_u32(code).ok_or(Error::UnknownTrapCode(code))
    }
}

impl std::fmt::Display for TrapCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrapCode::StackOverflow => "stack overflow",
            TrapCode::IndirectCallToNull => "call to a missing function",
            TrapCode::BadSignature => "bad signature",
        };
        f.write_str(s)
    }
}

/// Trap information for an offset in a compiled function.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapSite {
    pub offset: u32,
    pub code: TrapCode,
}

impl TrapSite {
    /// Size of a trap site in a serialized trap table.
    pub const SERIALIZED_SIZE: usize = 8;
}

/// The trap sites of a single function, sorted by offset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrapManifest {
    traps: Vec<TrapSite>,
}

impl TrapManifest {
    pub fn new(mut traps: Vec<TrapSite>) -> TrapManifest {
        traps.sort_by_key(|ts| ts.offset);
        TrapManifest { traps }
    }

    pub fn traps(&self) -> &[TrapSite] {
        &self.traps
    }

    /// Encode as a trap table: each site is its offset then its code, both little-endian `u32`s.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.traps.len() * TrapSite::SERIALIZED_SIZE];
        for (site, chunk) in self
            .traps
            .iter()
            .zip(bytes.chunks_exact_mut(TrapSite::SERIALIZED_SIZE))
        {
            LittleEndian::write_u32(&mut chunk[0..4], site.offset);
            LittleEndian::write_u32(&mut chunk[4..8], site.code as u32);
        }
        bytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TrapManifest, Error> {
        if bytes.len() % TrapSite::SERIALIZED_SIZE != 0 {
            return Err(Error::TrapTableLength(bytes.len()));
        }
        let traps = bytes
            .chunks_exact(TrapSite::SERIALIZED_SIZE)
            .map(|chunk| {
                Ok(TrapSite {
                    offset: LittleEndian::read_u32(&chunk[0..4]),
                    code: TrapCode::try_from_u32(LittleEndian::read_u32(&chunk[4..8]))?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(TrapManifest::new(traps))
    }
}
