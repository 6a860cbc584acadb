use std::collections::HashMap;

use glam::Vec2;
use tilestream_core::types::{ChunkCoord, ObjectId};
use tilestream_core::{EntityRecord, MobileChunk};
use tilestream_persist::{PersistError, WorldStorage};

/// Dynamic objects that are currently resident.
#[derive(Default)]
pub struct ObjectRegistry {
    mobiles: HashMap<u32, MobileChunk>,
    entities: HashMap<u32, EntityRecord>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resident(&self, id: ObjectId) -> bool {
        match id {
            ObjectId::Mobile(uid) => self.mobiles.contains_key(&uid),
            ObjectId::Entity(uid) => self.entities.contains_key(&uid),
        }
    }

    /// Chunk the object physically occupies.
    pub fn location(&self, id: ObjectId) -> Option<ChunkCoord> {
        match id {
            ObjectId::Mobile(uid) => self.mobiles.get(&uid).map(MobileChunk::location),
            ObjectId::Entity(uid) => self.entities.get(&uid).map(EntityRecord::location),
        }
    }

    pub fn mobile(&self, uid: u32) -> Option<&MobileChunk> {
        self.mobiles.get(&uid)
    }

    pub fn mobile_mut(&mut self, uid: u32) -> Option<&mut MobileChunk> {
        self.mobiles.get_mut(&uid)
    }

    pub fn entity(&self, uid: u32) -> Option<&EntityRecord> {
        self.entities.get(&uid)
    }

    pub fn entity_mut(&mut self, uid: u32) -> Option<&mut EntityRecord> {
        self.entities.get_mut(&uid)
    }

    pub fn insert_mobile(&mut self, mobile: MobileChunk) {
        self.mobiles.insert(mobile.uid, mobile);
    }

    pub fn insert_entity(&mut self, entity: EntityRecord) {
        self.entities.insert(entity.uid, entity);
    }

    /// Move an object's position in world tile units. Mobile chunks keep
    /// their z.
    pub fn set_position(&mut self, id: ObjectId, position: Vec2) -> bool {
        match id {
            ObjectId::Mobile(uid) => match self.mobiles.get_mut(&uid) {
                Some(m) => {
                    m.body.position.x = position.x;
                    m.body.position.y = position.y;
                    true
                }
                None => false,
            },
            ObjectId::Entity(uid) => match self.entities.get_mut(&uid) {
                Some(e) => {
                    e.position = position;
                    true
                }
                None => false,
            },
        }
    }

    /// Read an object from storage and make it resident.
    ///
    /// Returns the chunk it occupies, or `None` if no record exists.
    pub fn load(
        &mut self,
        id: ObjectId,
        storage: &WorldStorage,
    ) -> Result<Option<ChunkCoord>, PersistError> {
        match id {
            ObjectId::Mobile(uid) => Ok(storage.read_mobile(uid)?.map(|mobile| {
                let location = mobile.location();
                self.mobiles.insert(uid, mobile);
                location
            })),
            ObjectId::Entity(uid) => Ok(storage.read_entity(uid)?.map(|entity| {
                let location = entity.location();
                self.entities.insert(uid, entity);
                location
            })),
        }
    }

    /// Persist a resident object. Non-resident ids are ignored.
    pub fn save(&self, id: ObjectId, storage: &WorldStorage) -> Result<(), PersistError> {
        match id {
            ObjectId::Mobile(uid) => match self.mobiles.get(&uid) {
                Some(mobile) => storage.write_mobile(mobile),
                None => Ok(()),
            },
            ObjectId::Entity(uid) => match self.entities.get(&uid) {
                Some(entity) => storage.write_entity(entity),
                None => Ok(()),
            },
        }
    }

    /// Drop an object from residency, returning whether it was resident.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        match id {
            ObjectId::Mobile(uid) => self.mobiles.remove(&uid).is_some(),
            ObjectId::Entity(uid) => self.entities.remove(&uid).is_some(),
        }
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .mobiles
            .keys()
            .map(|&uid| ObjectId::Mobile(uid))
            .chain(self.entities.keys().map(|&uid| ObjectId::Entity(uid)))
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.mobiles.len() + self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
