//! Binary persistence of a [`StateSpaceStore`].
//!
//! Two little-endian files, read back by any consumer of the explored graph:
//!
//! ```text
//! states.bin
//!   magic "PNSS" | kind 'S' | version u16
//!   places u32, then per place: len u32 + UTF-8 name
//!   tokens u32, then per token: len u32 + UTF-8 name
//!   states u32, then per state:
//!     id u32 | classification u8 (0 tangible, 1 vanishing)
//!     places x tokens counts u64 (u64::MAX = omega)
//!
//! transitions.bin
//!   magic "PNSS" | kind 'R' | version u16
//!   records u32, then per record:
//!     state u32 | successors u32, then per successor:
//!       id u32 | rate f64 | labels u32, then per label: len u32 + UTF-8
//! ```
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::net::ids::StateId;
use crate::state::{Classification, ClassifiedState, Marking, TokenCount};
use crate::store::record::Record;
use crate::store::{StateSpaceStore, StoreError};

pub const STATES_FILE: &str = "states.bin";
pub const RECORDS_FILE: &str = "transitions.bin";

const MAGIC: &[u8; 4] = b"PNSS";
const STATES_KIND: u8 = b'S';
const RECORDS_KIND: u8 = b'R';
const VERSION: u16 = 1;

/// Upper bound for a single string; larger lengths mean a corrupt file.
const MAX_STRING_LEN: u32 = 1 << 20;

impl StateSpaceStore {
    pub fn write_states<W: Write>(&self, mut writer: W) -> Result<(), StoreError> {
        write_header(&mut writer, STATES_KIND)?;
        write_strings(&mut writer, self.place_names())?;
        write_strings(&mut writer, self.token_names())?;
        writer.write_u32::<LittleEndian>(len_u32(self.len())?)?;
        for (id, state) in self.states() {
            writer.write_u32::<LittleEndian>(id.raw())?;
            writer.write_u8(match state.classification {
                Classification::Tangible => 0,
                Classification::Vanishing => 1,
            })?;
            for count in state.marking.counts() {
                writer.write_u64::<LittleEndian>(count.to_raw())?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_records<W: Write>(&self, mut writer: W) -> Result<(), StoreError> {
        write_header(&mut writer, RECORDS_KIND)?;
        writer.write_u32::<LittleEndian>(len_u32(self.len())?)?;
        for record in self.records() {
            writer.write_u32::<LittleEndian>(record.state.raw())?;
            writer.write_u32::<LittleEndian>(len_u32(record.len())?)?;
            for (target, successor) in record.successors() {
                writer.write_u32::<LittleEndian>(target.raw())?;
                writer.write_f64::<LittleEndian>(successor.rate)?;
                writer.write_u32::<LittleEndian>(len_u32(successor.labels.len())?)?;
                for label in &successor.labels {
                    write_string(&mut writer, label)?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a store back from its two streams and validates it.
    pub fn read_from<S: Read, R: Read>(mut states: S, mut records: R) -> Result<Self, StoreError> {
        read_header(&mut states, STATES_KIND, "states")?;
        let places = read_strings(&mut states)?;
        let tokens = read_strings(&mut states)?;
        if tokens.is_empty() {
            return Err(StoreError::Corrupt("no token types".into()));
        }
        let width = places.len().saturating_mul(tokens.len());
        let count = states.read_u32::<LittleEndian>()?;
        let mut parsed = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let id = StateId::new(states.read_u32::<LittleEndian>()?);
            let classification = match states.read_u8()? {
                0 => Classification::Tangible,
                1 => Classification::Vanishing,
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "classification byte {other} of {id}"
                    )));
                }
            };
            let mut counts = Vec::with_capacity(width.min(1 << 16));
            for _ in 0..width {
                counts.push(TokenCount::from_raw(states.read_u64::<LittleEndian>()?));
            }
            let marking = Marking::from_counts(tokens.len(), counts);
            parsed.push((id, ClassifiedState::new(marking, classification)));
        }

        read_header(&mut records, RECORDS_KIND, "transitions")?;
        let count = records.read_u32::<LittleEndian>()?;
        let mut parsed_records = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let mut record = Record::new(StateId::new(records.read_u32::<LittleEndian>()?));
            let successors = records.read_u32::<LittleEndian>()?;
            for _ in 0..successors {
                let target = StateId::new(records.read_u32::<LittleEndian>()?);
                let rate = records.read_f64::<LittleEndian>()?;
                if !rate.is_finite() || rate < 0.0 {
                    return Err(StoreError::Corrupt(format!(
                        "rate {rate} on edge {} -> {target}",
                        record.state
                    )));
                }
                let labels = read_strings(&mut records)?;
                record.add(target, rate, labels);
            }
            parsed_records.push(record);
        }

        Self::from_parts(places, tokens, parsed, parsed_records)
    }

    /// Writes `states.bin` and `transitions.bin` into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<(), StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.write_states(BufWriter::new(File::create(dir.join(STATES_FILE))?))?;
        self.write_records(BufWriter::new(File::create(dir.join(RECORDS_FILE))?))?;
        log::info!(
            "saved {} states and {} transitions to {}",
            self.len(),
            self.edge_count(),
            dir.display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let states = BufReader::new(File::open(dir.join(STATES_FILE))?);
        let records = BufReader::new(File::open(dir.join(RECORDS_FILE))?);
        Self::read_from(states, records)
    }
}

fn len_u32(len: usize) -> Result<u32, StoreError> {
    u32::try_from(len).map_err(|_| StoreError::Corrupt(format!("length {len} exceeds u32")))
}

fn write_header<W: Write>(writer: &mut W, kind: u8) -> Result<(), StoreError> {
    writer.write_all(MAGIC)?;
    writer.write_u8(kind)?;
    writer.write_u16::<LittleEndian>(VERSION)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R, kind: u8, expected: &'static str) -> Result<(), StoreError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC || reader.read_u8()? != kind {
        return Err(StoreError::BadMagic { expected });
    }
    let version = reader.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    Ok(())
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), StoreError> {
    writer.write_u32::<LittleEndian>(len_u32(value.len())?)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn write_strings<W: Write>(writer: &mut W, values: &[String]) -> Result<(), StoreError> {
    writer.write_u32::<LittleEndian>(len_u32(values.len())?)?;
    for value in values {
        write_string(writer, value)?;
    }
    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, StoreError> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(StoreError::Corrupt(format!("string length {len}")));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn read_strings<R: Read>(reader: &mut R) -> Result<Vec<String>, StoreError> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut values = Vec::with_capacity(count.min(1 << 12) as usize);
    for _ in 0..count {
        values.push(read_string(reader)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateSpaceStore {
        let marking = |counts: [TokenCount; 2]| Marking::from_counts(1, counts.to_vec());
        let mut first = Record::new(StateId::new(0));
        first.add(StateId::new(1), 0.5, ["T1".to_string(), "T0".to_string()]);
        first.add(StateId::new(0), 2.0, ["Loop".to_string()]);
        StateSpaceStore::from_parts(
            vec!["P0".into(), "P1".into()],
            vec!["Default".into()],
            vec![
                (
                    StateId::new(0),
                    ClassifiedState::tangible(marking([1.into(), TokenCount::Omega])),
                ),
                (
                    StateId::new(1),
                    ClassifiedState::vanishing(marking([0.into(), 3.into()])),
                ),
            ],
            vec![first],
        )
        .unwrap()
    }

    #[test]
    fn streams_reconstruct_equal_store() {
        let store = sample();
        let mut states = Vec::new();
        let mut records = Vec::new();
        store.write_states(&mut states).unwrap();
        store.write_records(&mut records).unwrap();

        assert_eq!(&states[..5], b"PNSSS");
        let loaded = StateSpaceStore::read_from(&states[..], &records[..]).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(
            loaded.state(StateId::new(0)).unwrap().marking.counts()[1],
            TokenCount::Omega
        );
    }

    #[test]
    fn rejects_swapped_files() {
        let store = sample();
        let mut states = Vec::new();
        let mut records = Vec::new();
        store.write_states(&mut states).unwrap();
        store.write_records(&mut records).unwrap();

        let err = StateSpaceStore::read_from(&records[..], &states[..]).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic { expected: "states" }));
    }

    #[test]
    fn rejects_future_version() {
        let store = sample();
        let mut states = Vec::new();
        let mut records = Vec::new();
        store.write_states(&mut states).unwrap();
        store.write_records(&mut records).unwrap();
        states[5] = 9;

        let err = StateSpaceStore::read_from(&states[..], &records[..]).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(9)));
    }

    #[test]
    fn huge_layout_fails_on_missing_counts() {
        // 2^17 places times 2^17 token types, yet no counts behind them.
        let names = vec![String::new(); 1 << 17];
        let mut states = Vec::new();
        write_header(&mut states, STATES_KIND).unwrap();
        write_strings(&mut states, &names).unwrap();
        write_strings(&mut states, &names).unwrap();
        states.write_u32::<LittleEndian>(1).unwrap();
        states.write_u32::<LittleEndian>(0).unwrap();
        states.write_u8(0).unwrap();
        states.write_u64::<LittleEndian>(1).unwrap();

        let mut records = Vec::new();
        sample().write_records(&mut records).unwrap();
        let err = StateSpaceStore::read_from(&states[..], &records[..]).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
