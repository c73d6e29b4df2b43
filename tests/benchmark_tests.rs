//! Performance benchmarks for critical game systems

use shared::chunk::{split_into_chunks, ChunkAssembler};
use shared::protocol::{parse_message, ParsedMessage, WireMessage};
use shared::{PlayerId, Rect, Role, Vector2, CELL_SIZE, CHUNK_THRESHOLD, WORLD_HEIGHT, WORLD_WIDTH};
use simulation::{EnemyManager, Outbox, SpatialGrid};
use std::time::Instant;

/// Deterministic spread of points over the arena
fn scatter(count: usize) -> Vec<Vector2> {
    (0..count)
        .map(|i| {
            let x = (i as f32 * 137.5) % WORLD_WIDTH;
            let y = (i as f32 * 71.3 + (i / 13) as f32 * 29.0) % WORLD_HEIGHT;
            Vector2::new(x, y)
        })
        .collect()
}

/// Benchmarks radius and rectangle queries over a populated grid
#[test]
fn benchmark_grid_queries() {
    let mut grid = SpatialGrid::new(CELL_SIZE);
    let points = scatter(500);
    for (i, point) in points.iter().enumerate() {
        grid.insert(i as u32, *point);
    }

    let iterations = 10_000;
    let start = Instant::now();
    let mut found = 0;

    for i in 0..iterations {
        let center = points[i % points.len()];
        found += grid.query_radius(center, 150.0).len();
        found += grid
            .query_rect(&Rect::new(center.x - 50.0, center.y - 50.0, 100.0, 100.0))
            .len();
    }

    let duration = start.elapsed();
    println!(
        "Grid queries: {} iterations in {:?} ({:.2} μs/iter, {} hits)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        found
    );

    assert!(found >= iterations);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks grid position updates as enemies move between cells
#[test]
fn benchmark_grid_updates() {
    let mut grid = SpatialGrid::new(CELL_SIZE);
    let points = scatter(500);
    for (i, point) in points.iter().enumerate() {
        grid.insert(i as u32, *point);
    }

    let iterations = 200;
    let start = Instant::now();

    for frame in 0..iterations {
        let offset = Vector2::new(frame as f32 * 3.0, frame as f32 * 2.0);
        for (i, point) in points.iter().enumerate() {
            let moved = *point + offset;
            let wrapped = Vector2::new(moved.x % WORLD_WIDTH, moved.y % WORLD_HEIGHT);
            grid.update_position(i as u32, wrapped);
        }
    }

    let duration = start.elapsed();
    println!(
        "Grid updates: {} frames of {} moves in {:?}",
        iterations,
        points.len(),
        duration
    );

    assert!(grid.is_consistent());
    assert_eq!(grid.len(), points.len());
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks ten seconds of tiered host updates with hundreds of enemies
#[test]
fn benchmark_tiered_enemy_update() {
    let mut manager = EnemyManager::new(42);
    let targets = vec![
        Vector2::new(WORLD_WIDTH / 2.0, WORLD_HEIGHT / 2.0),
        Vector2::new(300.0, 300.0),
    ];
    let mut outbox = Outbox::new();
    // Wave 124 is 8 + 4 * 123 = 500 enemies.
    let spawned = manager.spawn_wave(124, &targets, &mut outbox);
    assert_eq!(spawned.len(), 500);

    let dt = 1.0 / 60.0;
    let frames = 600;
    let start = Instant::now();

    for _ in 0..frames {
        manager.update(dt, &targets, Role::Host, &mut outbox);
        outbox.drain();
    }

    let duration = start.elapsed();
    let [close, medium, far] = manager.tier_counts();
    println!(
        "Tiered update: {} frames with {} enemies in {:?} ({:.2} ms/frame, tiers {}/{}/{})",
        frames,
        manager.len(),
        duration,
        duration.as_secs_f64() * 1000.0 / frames as f64,
        close,
        medium,
        far
    );

    assert!(manager.grid_is_consistent());
    // Should average well under a 60 Hz frame budget
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks splitting and reassembling oversized messages
#[test]
fn benchmark_chunk_roundtrip() {
    let mut manager = EnemyManager::new(7);
    let mut outbox = Outbox::new();
    manager.spawn_wave(60, &[Vector2::new(1000.0, 1000.0)], &mut outbox);
    let text = manager.spawn_message_for_all().encode();
    assert!(text.len() > CHUNK_THRESHOLD * 4);

    let sender = PlayerId::new("1");
    let mut assembler = ChunkAssembler::new();
    let iterations = 1000;
    let start = Instant::now();

    for i in 0..iterations {
        let mut complete = None;
        for chunk in split_into_chunks(&text, i, CHUNK_THRESHOLD) {
            let Some(ParsedMessage::Chunk(piece)) = parse_message(&chunk) else {
                panic!("Expected a chunk message");
            };
            complete = assembler.on_chunk(&sender, piece);
        }
        assert_eq!(complete.as_deref(), Some(text.as_str()));
    }

    let duration = start.elapsed();
    println!(
        "Chunk round trip: {} iterations of {} bytes in {:?}",
        iterations,
        text.len(),
        duration
    );

    assert!(duration.as_millis() < 2000);
}
