//! Coarse spatial index of dynamic objects.
//!
//! The world is partitioned into square regions of `side x side` chunks.
//! Each active region holds one sub-region per chunk listing the movable
//! chunks and entities located there. An object is listed in at most one
//! sub-region at a time.

use std::collections::HashMap;

use tilestream_core::types::{region_of_chunk, ChunkCoord, ObjectId, RegionCoord};
use tilestream_persist::{PersistError, SubRegionRecord, WorldStorage};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("Destination chunk {chunk} of {id:?} is in an inactive region")]
    DestinationInactive { id: ObjectId, chunk: ChunkCoord },
    #[error("Object {0:?} is not tracked by any active region")]
    UnknownObject(ObjectId),
    #[error("Object {0:?} is already tracked")]
    AlreadyTracked(ObjectId),
}

#[derive(Debug, Clone, Default)]
struct SubRegion {
    chunk: ChunkCoord,
    mobile_chunks: Vec<u32>,
    entities: Vec<u32>,
}

impl SubRegion {
    fn list_mut(&mut self, id: ObjectId) -> &mut Vec<u32> {
        match id {
            ObjectId::Mobile(_) => &mut self.mobile_chunks,
            ObjectId::Entity(_) => &mut self.entities,
        }
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        let list = self.list_mut(id);
        let before = list.len();
        list.retain(|&uid| uid != id.uid());
        list.len() != before
    }

    fn add(&mut self, id: ObjectId) {
        let list = self.list_mut(id);
        if !list.contains(&id.uid()) {
            list.push(id.uid());
        }
    }

    fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.mobile_chunks
            .iter()
            .map(|&uid| ObjectId::Mobile(uid))
            .chain(self.entities.iter().map(|&uid| ObjectId::Entity(uid)))
    }

    fn record(&self) -> SubRegionRecord {
        SubRegionRecord {
            mobile_chunks: self.mobile_chunks.clone(),
            entities: self.entities.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Region {
    coord: RegionCoord,
    sub_regions: Vec<SubRegion>,
}

impl Region {
    /// Re-point a (possibly recycled) region at `coord` with empty lists.
    fn reset(&mut self, coord: RegionCoord, side: i32) {
        self.coord = coord;
        self.sub_regions.resize_with((side * side) as usize, SubRegion::default);
        for lx in 0..side {
            for ly in 0..side {
                let sub = &mut self.sub_regions[(lx * side + ly) as usize];
                sub.chunk = ChunkCoord::new(coord.x * side + lx, coord.y * side + ly);
                sub.mobile_chunks.clear();
                sub.entities.clear();
            }
        }
    }

    fn records(&self) -> Vec<SubRegionRecord> {
        self.sub_regions.iter().map(SubRegion::record).collect()
    }
}

/// Object that an activated region wants resident, with the sub-region
/// chunk it was listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingObject {
    pub id: ObjectId,
    pub chunk: ChunkCoord,
}

pub struct RegionIndex {
    side: i32,
    regions: HashMap<RegionCoord, Region>,
    free: Vec<Region>,
    locations: HashMap<ObjectId, ChunkCoord>,
}

impl RegionIndex {
    pub fn new(chunks_per_side: u32) -> Self {
        Self {
            side: chunks_per_side.clamp(1, 256) as i32,
            regions: HashMap::new(),
            free: Vec::new(),
            locations: HashMap::new(),
        }
    }

    pub fn chunks_per_side(&self) -> u32 {
        self.side as u32
    }

    pub fn region_of(&self, chunk: ChunkCoord) -> RegionCoord {
        region_of_chunk(chunk, self.side as u32)
    }

    pub fn is_active(&self, region: RegionCoord) -> bool {
        self.regions.contains_key(&region)
    }

    pub fn active_regions(&self) -> Vec<RegionCoord> {
        let mut coords: Vec<RegionCoord> = self.regions.keys().copied().collect();
        coords.sort_by_key(|c| (c.x, c.y));
        coords
    }

    /// Chunks covered by a region, in storage order.
    pub fn chunks_of(&self, region: RegionCoord) -> Vec<ChunkCoord> {
        let side = self.side;
        let mut chunks = Vec::with_capacity((side * side) as usize);
        for lx in 0..side {
            for ly in 0..side {
                chunks.push(ChunkCoord::new(region.x * side + lx, region.y * side + ly));
            }
        }
        chunks
    }

    fn sub_index(&self, chunk: ChunkCoord) -> usize {
        let lx = chunk.x.rem_euclid(self.side);
        let ly = chunk.y.rem_euclid(self.side);
        (lx * self.side + ly) as usize
    }

    fn sub_region_mut(&mut self, chunk: ChunkCoord) -> Option<&mut SubRegion> {
        let idx = self.sub_index(chunk);
        let region = region_of_chunk(chunk, self.side as u32);
        self.regions
            .get_mut(&region)
            .and_then(|r| r.sub_regions.get_mut(idx))
    }

    /// Activate the region containing `chunk`.
    ///
    /// Returns the objects that must be loaded. Each one has already been
    /// removed from its sub-region list; loading it re-inserts it with
    /// [`RegionIndex::insert`]. `is_resident` filters objects that are live
    /// already. Returns an empty list if the region was active.
    ///
    /// A read failure leaves the region inactive, so the file on disk is
    /// never replaced by an empty record; the next chunk load retries.
    pub fn load_region_at_chunk(
        &mut self,
        chunk: ChunkCoord,
        storage: Option<&WorldStorage>,
        is_resident: impl Fn(ObjectId) -> bool,
    ) -> Result<Vec<PendingObject>, PersistError> {
        let coord = self.region_of(chunk);
        if self.regions.contains_key(&coord) {
            return Ok(Vec::new());
        }

        let count = (self.side * self.side) as usize;
        let records = match storage {
            Some(storage) => storage.read_region(coord, count)?.unwrap_or_default(),
            None => Vec::new(),
        };

        let mut region = self.free.pop().unwrap_or_default();
        region.reset(coord, self.side);

        let mut pending = Vec::new();
        for (sub, record) in region.sub_regions.iter_mut().zip(records) {
            let ids = record
                .mobile_chunks
                .into_iter()
                .map(ObjectId::Mobile)
                .chain(record.entities.into_iter().map(ObjectId::Entity));
            for id in ids {
                let listed = pending.iter().any(|p: &PendingObject| p.id == id);
                if listed || self.locations.contains_key(&id) {
                    log::warn!("Region {} lists {:?} twice, dropping duplicate", coord, id);
                    continue;
                }
                if is_resident(id) {
                    sub.add(id);
                    self.locations.insert(id, sub.chunk);
                } else {
                    pending.push(PendingObject {
                        id,
                        chunk: sub.chunk,
                    });
                }
            }
        }

        log::debug!(
            "Activated region {} ({} objects to load)",
            coord,
            pending.len()
        );
        self.regions.insert(coord, region);
        Ok(pending)
    }

    /// True if no chunk of the region is loaded, so it may be released.
    pub fn can_release(
        &self,
        region: RegionCoord,
        is_chunk_loaded: impl Fn(ChunkCoord) -> bool,
    ) -> bool {
        match self.regions.get(&region) {
            Some(r) => !r.sub_regions.iter().any(|sub| is_chunk_loaded(sub.chunk)),
            None => false,
        }
    }

    /// Objects currently listed in an active region.
    pub fn objects_in_region(&self, region: RegionCoord) -> Vec<ObjectId> {
        self.regions
            .get(&region)
            .map(|r| r.sub_regions.iter().flat_map(|sub| sub.objects()).collect())
            .unwrap_or_default()
    }

    /// Persist the region record and free the region.
    ///
    /// Its objects stop being tracked; they remain listed in the written
    /// record and are loaded again when the region next activates.
    pub fn release_region(
        &mut self,
        region: RegionCoord,
        storage: Option<&WorldStorage>,
    ) -> Result<bool, PersistError> {
        let Some(r) = self.regions.remove(&region) else {
            return Ok(false);
        };
        for id in r.sub_regions.iter().flat_map(|sub| sub.objects()) {
            self.locations.remove(&id);
        }
        let written = match storage {
            Some(storage) => storage.write_region(region, &r.records()),
            None => Ok(()),
        };
        self.free.push(r);
        written.map(|_| true)
    }

    /// Persist an active region without releasing it.
    pub fn save_region(
        &self,
        region: RegionCoord,
        storage: &WorldStorage,
    ) -> Result<(), PersistError> {
        match self.regions.get(&region) {
            Some(r) => storage.write_region(region, &r.records()),
            None => Ok(()),
        }
    }

    /// Start tracking an object in the sub-region of `chunk`.
    pub fn insert(&mut self, id: ObjectId, chunk: ChunkCoord) -> Result<(), RegionError> {
        if self.locations.contains_key(&id) {
            return Err(RegionError::AlreadyTracked(id));
        }
        let sub = self
            .sub_region_mut(chunk)
            .ok_or(RegionError::DestinationInactive { id, chunk })?;
        sub.add(id);
        self.locations.insert(id, chunk);
        Ok(())
    }

    /// Stop tracking an object. Returns the chunk it was listed under.
    pub fn remove(&mut self, id: ObjectId) -> Option<ChunkCoord> {
        let chunk = self.locations.remove(&id)?;
        if let Some(sub) = self.sub_region_mut(chunk) {
            sub.remove(id);
        }
        Some(chunk)
    }

    /// Move an object to the sub-region of `to`.
    ///
    /// Fails without side effects when the object is unknown or the
    /// destination region is inactive.
    pub fn move_object(&mut self, id: ObjectId, to: ChunkCoord) -> Result<(), RegionError> {
        let from = *self
            .locations
            .get(&id)
            .ok_or(RegionError::UnknownObject(id))?;
        if from == to {
            return Ok(());
        }
        if !self.is_active(self.region_of(to)) {
            return Err(RegionError::DestinationInactive { id, chunk: to });
        }
        if let Some(sub) = self.sub_region_mut(from) {
            sub.remove(id);
        }
        if let Some(sub) = self.sub_region_mut(to) {
            sub.add(id);
        }
        self.locations.insert(id, to);
        Ok(())
    }

    pub fn location(&self, id: ObjectId) -> Option<ChunkCoord> {
        self.locations.get(&id).copied()
    }

    /// UIDs listed in the sub-region of `chunk`.
    pub fn objects_at(&self, chunk: ChunkCoord) -> Vec<ObjectId> {
        let idx = self.sub_index(chunk);
        self.regions
            .get(&self.region_of(chunk))
            .and_then(|r| r.sub_regions.get(idx))
            .map(|sub| sub.objects().collect())
            .unwrap_or_default()
    }

    pub fn tracked_count(&self) -> usize {
        self.locations.len()
    }
}
