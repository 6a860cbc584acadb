use crate::error::PersistError;
use crate::format::{RecordReader, RecordWriter};

/// Object UIDs tracked in one sub-region (one chunk of a region).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubRegionRecord {
    pub mobile_chunks: Vec<u32>,
    pub entities: Vec<u32>,
}

/// Serialize sub-regions in storage order.
///
/// Per sub-region: u16 count + u32 movable-chunk UIDs, then u16 count +
/// u32 entity UIDs.
pub fn encode_region(sub_regions: &[SubRegionRecord]) -> Result<Vec<u8>, PersistError> {
    let mut w = RecordWriter::with_capacity(sub_regions.len() * 4);
    for sub in sub_regions {
        write_uids(&mut w, &sub.mobile_chunks)?;
        write_uids(&mut w, &sub.entities)?;
    }
    Ok(w.into_bytes())
}

/// Decode a region record holding exactly `sub_region_count` entries.
pub fn decode_region(
    record: &[u8],
    sub_region_count: usize,
) -> Result<Vec<SubRegionRecord>, PersistError> {
    let mut r = RecordReader::new(record);
    let mut out = Vec::with_capacity(sub_region_count);
    for _ in 0..sub_region_count {
        let mobile_chunks = read_uids(&mut r)?;
        let entities = read_uids(&mut r)?;
        out.push(SubRegionRecord {
            mobile_chunks,
            entities,
        });
    }
    r.finish()?;
    Ok(out)
}

fn write_uids(w: &mut RecordWriter, uids: &[u32]) -> Result<(), PersistError> {
    let count = u16::try_from(uids.len()).map_err(|_| PersistError::TooManyObjects(uids.len()))?;
    w.u16(count);
    for &uid in uids {
        w.u32(uid);
    }
    Ok(())
}

fn read_uids(r: &mut RecordReader<'_>) -> Result<Vec<u32>, PersistError> {
    let count = r.u16()? as usize;
    (0..count).map(|_| r.u32()).collect()
}
