use std::sync::Arc;

use glam::{IVec2, Vec2, Vec3};
use tilestream_core::{
    ChunkCoord, ChunkData, EntityRecord, LoaderId, MobileBody, MobileChunk, ObjectId,
    PaletteError, StreamingConfig, Tile, TileDef, TileLayer, TileTable,
};
use tilestream_persist::{SaveLayout, WorldMode};
use tilestream_world::notify::ChunkChange;
use tilestream_world::refcount::{LoadRequest, UnloadRequest};
use tilestream_world::region::RegionError;
use tilestream_world::replication::Authority;
use tilestream_world::state_machine::{ChunkJob, ChunkTarget, JobEvent};
use tilestream_world::terrain::{ChunkGenerator, EmptyGenerator, TerrainGenerator, TerrainTiles};
use tilestream_world::{EditError, World, WorldParams};

const A: LoaderId = LoaderId::Local(1);
const B: LoaderId = LoaderId::Local(2);
const DELAY: f64 = 1.0;

fn tiles() -> Arc<TileTable> {
    let names = ["stone", "dirt", "water", "wall", "ore"];
    let defs = names
        .iter()
        .enumerate()
        .map(|(i, n)| TileDef {
            id: i as u32 + 1,
            name: format!("core:{n}"),
        })
        .collect();
    Arc::new(TileTable::from_defs(defs).expect("valid tile table"))
}

fn terrain() -> Arc<dyn ChunkGenerator> {
    Arc::new(TerrainGenerator::new(
        7,
        TerrainTiles {
            stone: 1,
            dirt: 2,
            water: 3,
            wall: 4,
        },
    ))
}

fn empty() -> Arc<dyn ChunkGenerator> {
    Arc::new(EmptyGenerator)
}

fn config() -> StreamingConfig {
    StreamingConfig {
        chunks_per_region_side: 2,
        eviction_delay_secs: DELAY,
        worker_threads: 0,
        loader_radius: 1,
        move_retry_limit: 3,
        ..StreamingConfig::default()
    }
}

fn layout(root: &std::path::Path) -> SaveLayout {
    SaveLayout::new(root, "slot0", WorldMode::Play, "overworld")
}

fn world_at(root: &std::path::Path) -> World {
    World::new(WorldParams {
        config: config(),
        tiles: tiles(),
        layout: Some(layout(root)),
        generator: terrain(),
        authority: Authority::Authority,
    })
}

fn memory_world(generator: Arc<dyn ChunkGenerator>, authority: Authority) -> World {
    World::new(WorldParams {
        config: config(),
        tiles: tiles(),
        layout: None,
        generator,
        authority,
    })
}

/// Tick well past the eviction delay.
fn settle(world: &mut World) {
    for _ in 0..4 {
        world.tick(DELAY);
    }
}

fn completed(events: &[JobEvent], coord: ChunkCoord) -> Vec<ChunkJob> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Completed { coord: c, job, .. } if *c == coord => Some(*job),
            _ => None,
        })
        .collect()
}

#[test]
fn test_two_loaders_then_deferred_eviction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = world_at(dir.path());
    let c = IVec2::new(0, 0);

    assert_eq!(world.request_load(A, c), LoadRequest::NeedsLoad);
    world.tick(0.1);
    assert!(world.is_loaded(c));
    world
        .set_tile(IVec2::new(3, 3), TileLayer::Main, Tile::new(5, 1))
        .expect("edit");

    assert_eq!(world.request_load(B, c), LoadRequest::Added);
    assert_eq!(world.loaders(c), vec![A, B]);

    assert_eq!(world.request_unload(A, c), UnloadRequest::StillHeld);
    assert!(!world.eviction_pending(c));
    world.tick(DELAY * 2.0);
    assert!(world.is_loaded(c));

    assert!(matches!(
        world.request_unload(B, c),
        UnloadRequest::EvictionScheduled(_)
    ));
    assert!(world.eviction_pending(c));
    world.tick(DELAY * 0.5);
    assert!(world.is_loaded(c));

    settle(&mut world);
    assert!(!world.is_loaded(c));
    assert!(layout(dir.path()).chunk_path(c).exists());

    let events = world.drain_job_events();
    assert_eq!(
        completed(&events, c),
        vec![ChunkJob::Load, ChunkJob::Unload { save: true }]
    );
    assert_eq!(world.stats().chunks_written, 1);

    let visual = world.drain_visual_updates();
    assert_eq!(visual, vec![ChunkChange::Loaded(c), ChunkChange::Unloaded(c)]);
}

#[test]
fn test_reload_during_delay_keeps_chunk() {
    let mut world = memory_world(terrain(), Authority::Authority);
    let c = IVec2::new(2, -1);
    world.request_load(A, c);
    world.tick(0.1);
    world.request_unload(A, c);
    world.tick(DELAY * 0.5);

    assert_eq!(world.request_load(B, c), LoadRequest::EvictionCancelled);
    settle(&mut world);
    assert!(world.is_loaded(c));
    assert_eq!(completed(&world.drain_job_events(), c), vec![ChunkJob::Load]);
}

#[test]
fn test_request_load_is_idempotent() {
    let mut world = memory_world(terrain(), Authority::Authority);
    let c = IVec2::new(1, 1);
    assert_eq!(world.request_load(A, c), LoadRequest::NeedsLoad);
    assert_eq!(world.request_load(A, c), LoadRequest::AlreadyHeld);
    world.tick(0.1);
    assert_eq!(world.loaders(c), vec![A]);
    assert_eq!(completed(&world.drain_job_events(), c), vec![ChunkJob::Load]);

    // One unload releases the single reference.
    assert!(matches!(
        world.request_unload(A, c),
        UnloadRequest::EvictionScheduled(_)
    ));
    settle(&mut world);
    assert!(!world.is_loaded(c));
}

#[test]
fn test_residency_follows_loader_sets() {
    let mut world = memory_world(empty(), Authority::Authority);
    let coords: Vec<ChunkCoord> = (0..4).map(|i| IVec2::new(i, -i)).collect();
    let loaders = [A, B, LoaderId::Remote(9)];

    let mut seed = 0x2545_F491_u32;
    for step in 0..200 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let coord = coords[(seed % 4) as usize];
        let loader = loaders[((seed >> 8) % 3) as usize];
        if (seed >> 16) % 2 == 0 {
            world.request_load(loader, coord);
        } else {
            world.request_unload(loader, coord);
        }
        if step % 7 == 0 {
            world.tick(DELAY * 0.3);
        }
    }
    settle(&mut world);

    for &coord in &coords {
        let held = !world.loaders(coord).is_empty();
        assert_eq!(world.is_loaded(coord), held, "chunk {coord}");
        let target = if held {
            ChunkTarget::Loaded
        } else {
            ChunkTarget::Unloaded
        };
        assert_eq!(world.target(coord), target);
    }
    assert_eq!(world.stats().invariant_corrections, 0);
}

#[test]
fn test_load_unload_load_runs_in_order() {
    let mut world = memory_world(terrain(), Authority::Authority);
    let c = IVec2::new(-4, 2);
    world.request_load(A, c);
    world.tick(0.1);
    world.request_unload(A, c);
    world.tick(DELAY * 2.0);
    assert!(!world.is_loaded(c));
    world.request_load(A, c);
    world.tick(0.1);
    assert!(world.is_loaded(c));

    assert_eq!(
        completed(&world.drain_job_events(), c),
        vec![
            ChunkJob::Load,
            ChunkJob::Unload { save: true },
            ChunkJob::Load
        ]
    );
}

#[test]
fn test_edits_survive_eviction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let c = IVec2::new(-1, 0);
    let pos = IVec2::new(-5, 9);
    {
        let mut world = world_at(dir.path());
        world.request_load(A, c);
        world.tick(0.1);
        world
            .set_tile(pos, TileLayer::Foreground, Tile::new(5, 0x0F0F))
            .expect("edit");
        world.request_unload(A, c);
        settle(&mut world);
        assert!(!world.is_loaded(c));
    }

    let mut world = world_at(dir.path());
    world.request_load(B, c);
    world.tick(0.1);
    assert_eq!(
        world.tile(pos, TileLayer::Foreground),
        Some(Tile::new(5, 0x0F0F))
    );
    assert_eq!(world.stats().chunks_from_disk, 1);
    // Layers absent from the record are regenerated.
    let generated = TerrainGenerator::new(
        7,
        TerrainTiles {
            stone: 1,
            dirt: 2,
            water: 3,
            wall: 4,
        },
    );
    assert_eq!(
        world.tile(pos, TileLayer::Main),
        Some(generated.tile_at(TileLayer::Main, pos.x, pos.y))
    );
}

#[test]
fn test_unedited_chunk_is_not_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = world_at(dir.path());
    let c = IVec2::new(3, 3);
    world.request_load(A, c);
    world.tick(0.1);
    world.request_unload(A, c);
    settle(&mut world);
    assert!(!world.is_loaded(c));
    assert!(!layout(dir.path()).chunk_path(c).exists());
    assert_eq!(world.stats().chunks_written, 0);
}

#[test]
fn test_corrupt_chunk_file_falls_back_to_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let c = IVec2::new(0, 1);
    let path = layout(dir.path()).chunk_path(c);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, b"definitely not deflate").expect("write");

    let mut world = world_at(dir.path());
    world.request_load(A, c);
    world.tick(0.1);
    assert!(world.is_loaded(c));
    assert!(!path.exists());
    assert_eq!(world.stats().chunks_generated, 1);
    assert_eq!(world.stats().chunks_from_disk, 0);
}

#[test]
fn test_palette_overflow_rejected_through_world() {
    let defs = (1..=300u32)
        .map(|id| TileDef {
            id,
            name: format!("core:t{id}"),
        })
        .collect();
    let mut world = World::new(WorldParams {
        config: config(),
        tiles: Arc::new(TileTable::from_defs(defs).expect("valid tile table")),
        layout: None,
        generator: empty(),
        authority: Authority::Authority,
    });
    let c = IVec2::new(0, 0);
    world.request_load(A, c);
    world.tick(0.1);

    for i in 0..255u32 {
        let pos = IVec2::new((i % 32) as i32, (i / 32) as i32);
        world
            .set_tile(pos, TileLayer::Main, Tile::new(i + 1, 0))
            .expect("fits");
    }
    let pos = IVec2::new(31, 31);
    assert_eq!(
        world.set_tile(pos, TileLayer::Main, Tile::new(256, 0)),
        Err(EditError::Palette(PaletteError::Full(256)))
    );
    assert_eq!(world.tile(pos, TileLayer::Main), Some(Tile::EMPTY));
    assert_eq!(world.chunk(c).map(|ch| ch.palette().len()), Some(255));
    assert_eq!(world.tile(IVec2::new(0, 0), TileLayer::Main), Some(Tile::new(1, 0)));
    // Existing ids can still be placed.
    assert_eq!(world.set_tile(pos, TileLayer::Main, Tile::new(1, 0)), Ok(true));
}

#[test]
fn test_unregistered_edit_rejected_and_chunk_still_saved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let c = IVec2::new(0, 0);
    let good = IVec2::new(1, 1);
    {
        let mut world = world_at(dir.path());
        world.request_load(A, c);
        world.tick(0.1);
        world
            .set_tile(good, TileLayer::Main, Tile::new(5, 7))
            .expect("edit");
        assert_eq!(
            world.set_tile(IVec2::new(2, 2), TileLayer::Main, Tile::new(999, 0)),
            Err(EditError::UnregisteredTile(999))
        );
        assert_ne!(world.tile(IVec2::new(2, 2), TileLayer::Main), Some(Tile::new(999, 0)));

        world.request_unload(A, c);
        settle(&mut world);
        assert!(!world.is_loaded(c));
        assert!(layout(dir.path()).chunk_path(c).exists());
        assert_eq!(world.stats().chunks_written, 1);
    }

    let mut world = world_at(dir.path());
    world.request_load(A, c);
    world.tick(0.1);
    assert_eq!(world.tile(good, TileLayer::Main), Some(Tile::new(5, 7)));
}

#[test]
fn test_set_tile_on_unloaded_chunk() {
    let mut world = memory_world(terrain(), Authority::Authority);
    assert_eq!(
        world.set_tile(IVec2::new(500, 500), TileLayer::Main, Tile::new(1, 0)),
        Ok(false)
    );
    assert_eq!(world.tile(IVec2::new(500, 500), TileLayer::Main), None);
}

#[test]
fn test_update_loader_streams_box() {
    let mut world = memory_world(terrain(), Authority::Authority);
    let delta = world.update_loader(A, Vec2::new(16.0, 16.0));
    assert_eq!(delta.entered.len(), 9);
    world.tick(0.1);
    world.tick(0.1);
    assert_eq!(world.loaded_count(), 9);

    let delta = world.update_loader(A, Vec2::new(48.0, 16.0));
    assert_eq!(delta.entered.len(), 3);
    assert_eq!(delta.exited.len(), 3);
    settle(&mut world);
    assert_eq!(world.loaded_count(), 9);
    assert!(!world.is_loaded(IVec2::new(-1, 0)));
    assert!(world.is_loaded(IVec2::new(2, 0)));

    world.remove_loader(A);
    settle(&mut world);
    assert_eq!(world.loaded_count(), 0);
}

#[test]
fn test_save_all_writes_edited_chunks_and_stays_loaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = world_at(dir.path());
    let edited = IVec2::new(0, 0);
    let clean = IVec2::new(1, 0);
    world.request_load(A, edited);
    world.request_load(A, clean);
    world.tick(0.1);
    world
        .set_tile(IVec2::new(1, 1), TileLayer::Background, Tile::new(4, 0))
        .expect("edit");

    assert_eq!(world.save_all(), 1);
    world.tick(0.1);
    assert!(world.is_loaded(edited));
    assert_eq!(world.target(edited), ChunkTarget::Loaded);
    assert!(layout(dir.path()).chunk_path(edited).exists());
    assert!(!layout(dir.path()).chunk_path(clean).exists());
    assert_eq!(
        completed(&world.drain_job_events(), edited),
        vec![ChunkJob::Load, ChunkJob::Save]
    );
}

fn entity(uid: u32, x: f32, y: f32) -> EntityRecord {
    EntityRecord {
        uid,
        position: Vec2::new(x, y),
        payload: vec![uid as u8; 4],
    }
}

fn mobile(uid: u32, x: f32, y: f32) -> MobileChunk {
    let mut data = ChunkData::new(IVec2::ZERO);
    data.set_restricted_size(IVec2::new(4, 2));
    data.set_tile(TileLayer::Main, 1, 1, Tile::new(5, 0))
        .expect("edit");
    MobileChunk {
        uid,
        data,
        body: MobileBody {
            position: Vec3::new(x, y, 0.0),
            collider_offset: Vec2::ZERO,
            collider_size: Vec2::new(4.0, 2.0),
            velocity: Vec2::new(0.5, 0.0),
        },
    }
}

#[test]
fn test_region_reactivation_restores_objects_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let c = IVec2::new(0, 0);
    {
        let mut world = world_at(dir.path());
        world.request_load(A, c);
        world.tick(0.1);
        world.spawn_entity(entity(10, 3.0, 40.0)).expect("spawn entity");
        world.spawn_mobile_chunk(mobile(20, 40.0, 2.0)).expect("spawn mobile");
        world.shutdown();
        assert_eq!(world.loaded_count(), 0);
        assert!(world.objects().is_empty());
        assert!(world.regions().active_regions().is_empty());
    }

    let mut world = world_at(dir.path());
    // Any chunk of region (0, 0) activates it.
    world.request_load(B, IVec2::new(1, 1));
    world.tick(0.1);
    assert!(world.objects().is_resident(ObjectId::Entity(10)));
    assert!(world.objects().is_resident(ObjectId::Mobile(20)));
    assert_eq!(world.object_location(ObjectId::Entity(10)), Some(IVec2::new(0, 1)));
    assert_eq!(world.object_location(ObjectId::Mobile(20)), Some(IVec2::new(1, 0)));
    assert_eq!(
        world.objects().mobile(20).map(|m| m.data.restricted_size()),
        Some(IVec2::new(4, 2))
    );

    world.request_load(B, IVec2::new(0, 0));
    world.tick(0.1);
    let mut listed = world.regions().objects_in_region(IVec2::ZERO);
    listed.sort();
    assert_eq!(listed, vec![ObjectId::Mobile(20), ObjectId::Entity(10)]);
}

#[test]
fn test_spawn_requires_active_region() {
    let mut world = memory_world(terrain(), Authority::Authority);
    let err = world.spawn_entity(entity(1, 500.0, 500.0)).unwrap_err();
    assert!(matches!(err, RegionError::DestinationInactive { .. }));
    assert!(!world.objects().is_resident(ObjectId::Entity(1)));
}

#[test]
fn test_failed_move_retried_next_tick() {
    let mut world = memory_world(terrain(), Authority::Authority);
    world.request_load(A, IVec2::new(0, 0));
    world.tick(0.1);
    let id = ObjectId::Entity(3);
    world.spawn_entity(entity(3, 1.0, 1.0)).expect("spawn");

    // Region (2, 0) covers chunks x in 4..6.
    let err = world.move_object(id, Vec2::new(4.5 * 32.0, 1.0)).unwrap_err();
    assert!(matches!(err, RegionError::DestinationInactive { .. }));
    assert_eq!(world.object_location(id), Some(IVec2::new(0, 0)));
    assert!(world.has_pending_move(id));

    world.request_load(A, IVec2::new(4, 0));
    world.tick(0.1);
    assert!(!world.has_pending_move(id));
    assert_eq!(world.object_location(id), Some(IVec2::new(4, 0)));
    assert!(world.regions().objects_at(IVec2::new(0, 0)).is_empty());
}

#[test]
fn test_failed_move_gives_up_after_limit() {
    let mut world = memory_world(terrain(), Authority::Authority);
    world.request_load(A, IVec2::new(0, 0));
    world.tick(0.1);
    let id = ObjectId::Entity(3);
    world.spawn_entity(entity(3, 1.0, 1.0)).expect("spawn");

    assert!(world.move_object(id, Vec2::new(-1000.0, 0.0)).is_err());
    for _ in 0..config().move_retry_limit {
        assert!(world.has_pending_move(id));
        world.tick(0.1);
    }
    assert!(!world.has_pending_move(id));
    assert_eq!(world.object_location(id), Some(IVec2::new(0, 0)));
    assert_eq!(world.regions().objects_at(IVec2::new(0, 0)), vec![id]);
}

#[test]
fn test_move_unknown_object() {
    let mut world = memory_world(terrain(), Authority::Authority);
    assert_eq!(
        world.move_object(ObjectId::Mobile(1), Vec2::ZERO),
        Err(RegionError::UnknownObject(ObjectId::Mobile(1)))
    );
}

#[test]
fn test_replica_mirrors_authority() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut authority = world_at(dir.path());
    let mut replica = memory_world(empty(), Authority::Replica);
    let remote = LoaderId::Remote(1);
    let c = IVec2::new(1, 0);

    authority.request_load(remote, c);
    assert!(authority.drain_outbound().is_empty());
    authority.tick(0.1);
    let outbound = authority.drain_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].to, remote);
    assert_eq!(outbound[0].message.coord, c);

    let outcome = replica
        .receive_chunk_message(LoaderId::Local(0), &outbound[0].message)
        .expect("decode");
    assert_eq!(outcome, LoadRequest::NeedsLoad);
    replica.tick(0.1);
    assert!(replica.is_loaded(c));
    let a = authority.chunk(c).expect("authority chunk");
    let r = replica.chunk(c).expect("replica chunk");
    assert!(a.same_content(r));
    assert!(replica.drain_outbound().is_empty());

    // A second remote loader gets the resident chunk right away.
    authority.request_load(LoaderId::Remote(2), c);
    let outbound = authority.drain_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].to, LoaderId::Remote(2));

    // Releasing on the replica follows the same eviction path.
    replica.request_unload(LoaderId::Local(0), c);
    settle(&mut replica);
    assert!(!replica.is_loaded(c));
}

#[test]
fn test_force_unload_cancels_queued_jobs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = world_at(dir.path());
    let c = IVec2::new(5, 5);
    world.request_load(A, c);
    world.tick(0.1);
    world
        .set_tile(IVec2::new(160, 160), TileLayer::Main, Tile::new(1, 0))
        .expect("edit");

    // Exhaust the per-tick budget so later jobs queue.
    for i in 0..8 {
        world.request_load(B, IVec2::new(100 + i, 0));
    }
    world.save_all();
    assert!(world.force_unload(c));

    assert!(!world.is_loaded(c));
    assert!(world.loaders(c).is_empty());
    assert_eq!(world.target(c), ChunkTarget::Unloaded);
    assert!(layout(dir.path()).chunk_path(c).exists());

    let events = world.drain_job_events();
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Cancelled {
            coord,
            job: ChunkJob::Save,
            ..
        } if *coord == c
    )));
    let mut ids: Vec<_> = events.iter().map(JobEvent::id).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total, "one terminal event per job");

    settle(&mut world);
    assert!(!world.is_loaded(c));
}

#[test]
fn test_worker_pool_world_loads_and_shuts_down() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = World::new(WorldParams {
        config: StreamingConfig {
            worker_threads: 2,
            ..config()
        },
        tiles: tiles(),
        layout: Some(layout(dir.path())),
        generator: terrain(),
        authority: Authority::Authority,
    });
    world.update_loader(A, Vec2::new(0.0, 0.0));
    for _ in 0..500 {
        world.tick(0.01);
        if world.loaded_count() == 9 && !world.has_pending_jobs() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    assert_eq!(world.loaded_count(), 9);

    world
        .set_tile(IVec2::new(0, 0), TileLayer::Main, Tile::new(5, 0))
        .expect("edit");
    world.shutdown();
    assert_eq!(world.loaded_count(), 0);
    assert!(!world.has_pending_jobs());
    assert!(layout(dir.path()).chunk_path(IVec2::ZERO).exists());
}
