//! Host and client handlers for every message tag.
//!
//! Host handlers check that a peer only speaks for itself, apply the change
//! and relay it to everyone else. Client handlers trust the host and apply
//! what it says. Messages only the host may originate are ignored by the
//! host handler table.

use crate::dispatch::Dispatcher;
use log::{debug, warn};
use shared::protocol::{
    BulletMsg, ConnectMsg, DamageMsg, DeathMsg, DisconnectMsg, EnemyFullSyncMsg, EnemyHitMsg,
    EnemySpawnMsg, EnemySyncMsg, ForceFieldMsg, KillNotifyMsg, MovementMsg, ReadyMsg,
    RespawnMsg, RosterMsg, WireMessage, ZapMsg,
};
use shared::PlayerId;
use simulation::World;

/// Registers every tag this protocol version handles.
pub fn register_all(dispatcher: &mut Dispatcher) {
    dispatcher.register::<ConnectMsg>(host_connect, client_connect);
    dispatcher.register::<RosterMsg>(ignore, client_roster);
    dispatcher.register::<ReadyMsg>(host_ready, client_ready);
    dispatcher.register::<DisconnectMsg>(host_disconnect, client_disconnect);
    dispatcher.register::<MovementMsg>(host_movement, client_movement);
    dispatcher.register::<BulletMsg>(host_bullet, client_bullet);
    dispatcher.register::<DeathMsg>(ignore, client_death);
    dispatcher.register::<RespawnMsg>(host_respawn, client_respawn);
    dispatcher.register::<DamageMsg>(ignore, client_damage);
    dispatcher.register::<KillNotifyMsg>(ignore, client_kill_notify);
    dispatcher.register::<EnemySpawnMsg>(ignore, client_enemy_spawn);
    dispatcher.register::<EnemySyncMsg>(ignore, client_enemy_sync);
    dispatcher.register::<EnemyFullSyncMsg>(ignore, client_enemy_full_sync);
    dispatcher.register::<EnemyHitMsg>(ignore, client_enemy_hit);
    dispatcher.register::<ZapMsg>(host_zap, ignore);
    dispatcher.register::<ForceFieldMsg>(host_force_field, client_force_field);
}

/// Authoritative messages coming the wrong way are dropped.
fn ignore<M: WireMessage>(_world: &mut World, sender: &PlayerId, _msg: M) {
    debug!("Ignoring {} from {}", M::TAG, sender);
}

fn speaks_for_self(claimed: &PlayerId, sender: &PlayerId, tag: &str) -> bool {
    if claimed == sender {
        return true;
    }
    warn!("{} from {} claims to be {}, dropping", tag, sender, claimed);
    false
}

// ---------------------------------------------------------------------------
// Host

fn host_connect(world: &mut World, sender: &PlayerId, msg: ConnectMsg) {
    if !speaks_for_self(&msg.player_id, sender, ConnectMsg::TAG) {
        return;
    }
    let spawn = world.next_spawn_point();
    world.players_mut().upsert_from_connect(&msg, spawn);

    let roster = world.players().roster();
    let enemies = (!world.enemies().is_empty()).then(|| world.enemies().spawn_message_for_all());
    let force_field = world
        .players()
        .local_player()
        .filter(|p| p.force_field.enabled)
        .map(|p| p.force_field.to_message(&p.id));

    let outbox = world.outbox_mut();
    outbox.send_to(sender, &roster);
    if let Some(enemies) = enemies {
        outbox.send_to(sender, &enemies);
    }
    if let Some(force_field) = force_field {
        outbox.send_to(sender, &force_field);
    }
    outbox.broadcast_except(&msg, sender);
}

fn host_ready(world: &mut World, sender: &PlayerId, msg: ReadyMsg) {
    if speaks_for_self(&msg.player_id, sender, ReadyMsg::TAG) && world.players_mut().apply_ready(&msg) {
        world.outbox_mut().broadcast_except(&msg, sender);
    }
}

fn host_disconnect(world: &mut World, sender: &PlayerId, msg: DisconnectMsg) {
    if speaks_for_self(&msg.player_id, sender, DisconnectMsg::TAG)
        && world.players_mut().remove_player(&msg.player_id).is_some()
    {
        world.outbox_mut().broadcast_except(&msg, sender);
    }
}

fn host_movement(world: &mut World, sender: &PlayerId, msg: MovementMsg) {
    if speaks_for_self(&msg.player_id, sender, MovementMsg::TAG) && world.players_mut().apply_movement(&msg) {
        world.outbox_mut().broadcast_except(&msg, sender);
    }
}

fn host_bullet(world: &mut World, sender: &PlayerId, msg: BulletMsg) {
    if speaks_for_self(&msg.shooter, sender, BulletMsg::TAG) && world.players_mut().spawn_remote_bullet(&msg) {
        world.outbox_mut().broadcast_except(&msg, sender);
    }
}

fn host_respawn(world: &mut World, sender: &PlayerId, msg: RespawnMsg) {
    if speaks_for_self(&msg.player_id, sender, RespawnMsg::TAG) && world.players_mut().apply_respawn(&msg) {
        world.outbox_mut().broadcast_except(&msg, sender);
    }
}

fn host_zap(world: &mut World, sender: &PlayerId, msg: ZapMsg) {
    if speaks_for_self(&msg.player_id, sender, ZapMsg::TAG) {
        world.apply_zap(&msg);
    }
}

fn host_force_field(world: &mut World, sender: &PlayerId, msg: ForceFieldMsg) {
    if speaks_for_self(&msg.player_id, sender, ForceFieldMsg::TAG)
        && world.players_mut().apply_force_field(&msg)
    {
        world.outbox_mut().broadcast_except(&msg, sender);
    }
}

// ---------------------------------------------------------------------------
// Client

fn client_connect(world: &mut World, _sender: &PlayerId, msg: ConnectMsg) {
    let spawn = world.next_spawn_point();
    world.players_mut().upsert_from_connect(&msg, spawn);
}

fn client_roster(world: &mut World, _sender: &PlayerId, msg: RosterMsg) {
    world.players_mut().apply_roster(&msg);
}

fn client_ready(world: &mut World, _sender: &PlayerId, msg: ReadyMsg) {
    world.players_mut().apply_ready(&msg);
}

fn client_disconnect(world: &mut World, _sender: &PlayerId, msg: DisconnectMsg) {
    world.players_mut().remove_player(&msg.player_id);
}

fn client_movement(world: &mut World, _sender: &PlayerId, msg: MovementMsg) {
    world.players_mut().apply_movement(&msg);
}

fn client_bullet(world: &mut World, _sender: &PlayerId, msg: BulletMsg) {
    world.players_mut().spawn_remote_bullet(&msg);
}

fn client_death(world: &mut World, _sender: &PlayerId, msg: DeathMsg) {
    world.players_mut().apply_death(&msg);
}

fn client_respawn(world: &mut World, _sender: &PlayerId, msg: RespawnMsg) {
    world.players_mut().apply_respawn(&msg);
}

fn client_damage(world: &mut World, _sender: &PlayerId, msg: DamageMsg) {
    world.players_mut().apply_damage(&msg);
}

fn client_kill_notify(world: &mut World, _sender: &PlayerId, msg: KillNotifyMsg) {
    world.players_mut().apply_kill_notify(&msg);
}

fn client_enemy_spawn(world: &mut World, _sender: &PlayerId, msg: EnemySpawnMsg) {
    let targets = world.players().living_targets();
    world.enemies_mut().apply_spawn_batch(&msg, &targets);
}

fn client_enemy_sync(world: &mut World, _sender: &PlayerId, msg: EnemySyncMsg) {
    world.enemies_mut().apply_position_batch(&msg.enemies);
}

fn client_enemy_full_sync(world: &mut World, _sender: &PlayerId, msg: EnemyFullSyncMsg) {
    let targets = world.players().living_targets();
    world.enemies_mut().apply_full_sync(&msg.ids, &targets);
}

fn client_enemy_hit(world: &mut World, _sender: &PlayerId, msg: EnemyHitMsg) {
    world.enemies_mut().apply_hit(&msg);
}

fn client_force_field(world: &mut World, _sender: &PlayerId, msg: ForceFieldMsg) {
    world.players_mut().apply_force_field(&msg);
}
