//! Text wire protocol.
//!
//! Every message is a tag followed by fields joined with `|`; compound fields
//! (vectors, colors, id lists) use `,` inside a single field. Field order per
//! tag is fixed and new fields are only ever appended, so an older peer simply
//! ignores trailing tokens it does not know about.
//!
//! Decoding is lenient: a missing or unparsable token becomes the field's
//! default instead of failing the whole message. Repeated groups (roster,
//! enemy batches) keep only complete groups.

use crate::identity::PlayerId;
use crate::math::{Color, Vector2};
use std::fmt::Display;

pub const DELIMITER: char = '|';
pub const FIELD_DELIMITER: char = ',';

pub mod tags {
    pub const CONNECT: &str = "C";
    pub const ROSTER: &str = "L";
    pub const READY: &str = "R";
    pub const DISCONNECT: &str = "D";
    pub const MOVEMENT: &str = "M";
    pub const BULLET: &str = "B";
    pub const DEATH: &str = "K";
    pub const RESPAWN: &str = "P";
    pub const DAMAGE: &str = "H";
    pub const KILL_NOTIFY: &str = "N";
    pub const ENEMY_SPAWN: &str = "W";
    pub const ENEMY_SYNC: &str = "E";
    pub const ENEMY_FULL_SYNC: &str = "F";
    pub const ENEMY_HIT: &str = "X";
    pub const FORCE_FIELD_ZAP: &str = "Z";
    pub const FORCE_FIELD_PARAMS: &str = "Q";
    pub const CHUNK: &str = "CK";
}

/// Enemy archetype; travels on the wire as a small integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnemyKind {
    #[default]
    Triangle,
    Square,
    Pentagon,
}

impl EnemyKind {
    pub fn code(self) -> u8 {
        match self {
            EnemyKind::Triangle => 0,
            EnemyKind::Square => 1,
            EnemyKind::Pentagon => 2,
        }
    }

    /// Unknown codes fall back to the basic chaser.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => EnemyKind::Square,
            2 => EnemyKind::Pentagon,
            _ => EnemyKind::Triangle,
        }
    }
}

/// Sequential reader over the tokens that follow a tag.
pub struct FieldReader<'a> {
    tokens: &'a [&'a str],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(tokens: &'a [&'a str]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.pos)
    }

    pub fn next_str(&mut self) -> &'a str {
        let token = self.tokens.get(self.pos).copied().unwrap_or("");
        self.pos += 1;
        token
    }

    /// Everything left, re-joined with the primary delimiter.
    pub fn rest(&mut self) -> String {
        let start = self.pos.min(self.tokens.len());
        self.pos = self.tokens.len();
        self.tokens[start..].join("|")
    }

    pub fn next_string(&mut self) -> String {
        self.next_str().to_string()
    }

    pub fn next_id(&mut self) -> PlayerId {
        PlayerId::new(self.next_str())
    }

    pub fn next_optional_id(&mut self) -> Option<PlayerId> {
        let id = self.next_id();
        (!id.is_empty()).then_some(id)
    }

    pub fn next_f32(&mut self) -> f32 {
        parse_f32(self.next_str())
    }

    pub fn next_i32(&mut self) -> i32 {
        self.next_str().trim().parse().unwrap_or_default()
    }

    pub fn next_u32(&mut self) -> u32 {
        self.next_str().trim().parse().unwrap_or_default()
    }

    pub fn next_optional_u32(&mut self) -> Option<u32> {
        self.next_str().trim().parse().ok()
    }

    pub fn next_bool(&mut self) -> bool {
        matches!(self.next_str().trim(), "1" | "true")
    }

    pub fn next_vec2(&mut self) -> Vector2 {
        let mut parts = self.next_str().split(FIELD_DELIMITER);
        let x = parse_f32(parts.next().unwrap_or(""));
        let y = parse_f32(parts.next().unwrap_or(""));
        Vector2::new(x, y)
    }

    pub fn next_color(&mut self) -> Color {
        let mut parts = self.next_str().split(FIELD_DELIMITER);
        let mut channel = || {
            parts
                .next()
                .and_then(|p| p.trim().parse::<u8>().ok())
                .unwrap_or_default()
        };
        let r = channel();
        let g = channel();
        let b = channel();
        Color::new(r, g, b)
    }

    pub fn next_u32_list(&mut self) -> Vec<u32> {
        self.next_str()
            .split(FIELD_DELIMITER)
            .filter_map(|p| p.trim().parse().ok())
            .collect()
    }
}

fn parse_f32(token: &str) -> f32 {
    token
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or_default()
}

/// Accumulates fields for one outgoing message.
#[derive(Default)]
pub struct FieldWriter {
    fields: Vec<String>,
}

impl FieldWriter {
    pub fn push_str(&mut self, value: &str) {
        self.fields.push(sanitize(value));
    }

    pub fn push_id(&mut self, id: &PlayerId) {
        self.fields.push(sanitize(id.as_str()));
    }

    pub fn push_num<T: Display>(&mut self, value: T) {
        self.fields.push(value.to_string());
    }

    pub fn push_f32(&mut self, value: f32) {
        self.fields.push(format!("{:.2}", value));
    }

    pub fn push_bool(&mut self, value: bool) {
        self.fields.push(if value { "1" } else { "0" }.to_string());
    }

    pub fn push_vec2(&mut self, value: Vector2) {
        self.fields.push(format!("{:.2},{:.2}", value.x, value.y));
    }

    pub fn push_color(&mut self, value: Color) {
        self.fields.push(format!("{},{},{}", value.r, value.g, value.b));
    }

    pub fn push_u32_list(&mut self, values: &[u32]) {
        let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.fields.push(joined.join(","));
    }

    /// Appends text verbatim; used for chunk slices that already carry delimiters.
    pub fn push_raw(&mut self, value: &str) {
        self.fields.push(value.to_string());
    }

    /// Fields joined without a leading tag.
    pub fn into_fragment(self) -> String {
        self.fields.join(DELIMITER.encode_utf8(&mut [0; 4]))
    }

    fn finish(self, tag: &str) -> String {
        let mut out = String::from(tag);
        for field in self.fields {
            out.push(DELIMITER);
            out.push_str(&field);
        }
        out
    }
}

/// Free text (player names) must never introduce extra delimiters.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == DELIMITER || c == FIELD_DELIMITER { ' ' } else { c })
        .collect()
}

/// A message type with a fixed tag and field layout.
pub trait WireMessage: Default + Sized {
    const TAG: &'static str;

    fn write_fields(&self, out: &mut FieldWriter);

    fn read_fields(fields: &mut FieldReader) -> Self;

    fn encode(&self) -> String {
        let mut writer = FieldWriter::default();
        self.write_fields(&mut writer);
        writer.finish(Self::TAG)
    }

    fn decode(tokens: &[&str]) -> Self {
        Self::read_fields(&mut FieldReader::new(tokens))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectMsg {
    pub player_id: PlayerId,
    pub name: String,
    pub color: Color,
    pub is_ready: bool,
    pub is_host: bool,
}

impl WireMessage for ConnectMsg {
    const TAG: &'static str = tags::CONNECT;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_str(&self.name);
        out.push_color(self.color);
        out.push_bool(self.is_ready);
        out.push_bool(self.is_host);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            name: fields.next_string(),
            color: fields.next_color(),
            is_ready: fields.next_bool(),
            is_host: fields.next_bool(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub color: Color,
    pub is_ready: bool,
    pub is_host: bool,
    pub position: Vector2,
    pub health: i32,
    pub kills: u32,
    pub money: u32,
    pub is_dead: bool,
}

const ROSTER_ENTRY_FIELDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RosterMsg {
    pub players: Vec<RosterEntry>,
}

impl WireMessage for RosterMsg {
    const TAG: &'static str = tags::ROSTER;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_num(self.players.len());
        for p in &self.players {
            out.push_id(&p.player_id);
            out.push_str(&p.name);
            out.push_color(p.color);
            out.push_bool(p.is_ready);
            out.push_bool(p.is_host);
            out.push_vec2(p.position);
            out.push_num(p.health);
            out.push_num(p.kills);
            out.push_num(p.money);
            out.push_bool(p.is_dead);
        }
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        let declared = fields.next_u32() as usize;
        let mut players = Vec::new();
        while players.len() < declared && fields.remaining() >= ROSTER_ENTRY_FIELDS {
            players.push(RosterEntry {
                player_id: fields.next_id(),
                name: fields.next_string(),
                color: fields.next_color(),
                is_ready: fields.next_bool(),
                is_host: fields.next_bool(),
                position: fields.next_vec2(),
                health: fields.next_i32(),
                kills: fields.next_u32(),
                money: fields.next_u32(),
                is_dead: fields.next_bool(),
            });
        }
        Self { players }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadyMsg {
    pub player_id: PlayerId,
    pub is_ready: bool,
}

impl WireMessage for ReadyMsg {
    const TAG: &'static str = tags::READY;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_bool(self.is_ready);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            is_ready: fields.next_bool(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisconnectMsg {
    pub player_id: PlayerId,
}

impl WireMessage for DisconnectMsg {
    const TAG: &'static str = tags::DISCONNECT;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovementMsg {
    pub player_id: PlayerId,
    pub position: Vector2,
}

impl WireMessage for MovementMsg {
    const TAG: &'static str = tags::MOVEMENT;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_vec2(self.position);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            position: fields.next_vec2(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulletMsg {
    pub shooter: PlayerId,
    pub position: Vector2,
    pub direction: Vector2,
    pub bullet_id: Option<u32>,
}

impl WireMessage for BulletMsg {
    const TAG: &'static str = tags::BULLET;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.shooter);
        out.push_vec2(self.position);
        out.push_vec2(self.direction);
        match self.bullet_id {
            Some(id) => out.push_num(id),
            None => out.push_str(""),
        }
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            shooter: fields.next_id(),
            position: fields.next_vec2(),
            direction: fields.next_vec2(),
            bullet_id: fields.next_optional_u32(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeathMsg {
    pub victim: PlayerId,
    /// Absent when an enemy, not a player, landed the final blow.
    pub killer: Option<PlayerId>,
}

impl WireMessage for DeathMsg {
    const TAG: &'static str = tags::DEATH;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.victim);
        match &self.killer {
            Some(killer) => out.push_id(killer),
            None => out.push_str(""),
        }
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            victim: fields.next_id(),
            killer: fields.next_optional_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RespawnMsg {
    pub player_id: PlayerId,
    pub position: Vector2,
}

impl WireMessage for RespawnMsg {
    const TAG: &'static str = tags::RESPAWN;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_vec2(self.position);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            position: fields.next_vec2(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DamageMsg {
    pub player_id: PlayerId,
    pub amount: i32,
    pub health_after: i32,
}

impl WireMessage for DamageMsg {
    const TAG: &'static str = tags::DAMAGE;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_num(self.amount);
        out.push_num(self.health_after);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            amount: fields.next_i32(),
            health_after: fields.next_i32(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KillNotifyMsg {
    pub killer: PlayerId,
    pub kills: u32,
    pub money: u32,
}

impl WireMessage for KillNotifyMsg {
    const TAG: &'static str = tags::KILL_NOTIFY;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.killer);
        out.push_num(self.kills);
        out.push_num(self.money);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            killer: fields.next_id(),
            kills: fields.next_u32(),
            money: fields.next_u32(),
        }
    }
}

/// Spawn-time description of one enemy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnemyRecord {
    pub id: u32,
    pub kind: EnemyKind,
    pub position: Vector2,
    pub health: i32,
}

const ENEMY_RECORD_FIELDS: usize = 4;

impl EnemyRecord {
    pub fn write(&self, out: &mut FieldWriter) {
        out.push_num(self.id);
        out.push_num(self.kind.code());
        out.push_vec2(self.position);
        out.push_num(self.health);
    }

    pub fn read(fields: &mut FieldReader) -> Self {
        Self {
            id: fields.next_u32(),
            kind: EnemyKind::from_code(fields.next_u32().min(u8::MAX as u32) as u8),
            position: fields.next_vec2(),
            health: fields.next_i32(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnemySpawnMsg {
    pub wave: u32,
    pub enemies: Vec<EnemyRecord>,
}

impl WireMessage for EnemySpawnMsg {
    const TAG: &'static str = tags::ENEMY_SPAWN;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_num(self.wave);
        for enemy in &self.enemies {
            enemy.write(out);
        }
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        let wave = fields.next_u32();
        let mut enemies = Vec::new();
        while fields.remaining() >= ENEMY_RECORD_FIELDS {
            enemies.push(EnemyRecord::read(fields));
        }
        Self { wave, enemies }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnemyState {
    pub id: u32,
    pub position: Vector2,
    pub health: i32,
}

const ENEMY_STATE_FIELDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnemySyncMsg {
    pub enemies: Vec<EnemyState>,
}

impl WireMessage for EnemySyncMsg {
    const TAG: &'static str = tags::ENEMY_SYNC;

    fn write_fields(&self, out: &mut FieldWriter) {
        for enemy in &self.enemies {
            out.push_num(enemy.id);
            out.push_vec2(enemy.position);
            out.push_num(enemy.health);
        }
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        let mut enemies = Vec::new();
        while fields.remaining() >= ENEMY_STATE_FIELDS {
            enemies.push(EnemyState {
                id: fields.next_u32(),
                position: fields.next_vec2(),
                health: fields.next_i32(),
            });
        }
        Self { enemies }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnemyFullSyncMsg {
    pub ids: Vec<u32>,
}

impl WireMessage for EnemyFullSyncMsg {
    const TAG: &'static str = tags::ENEMY_FULL_SYNC;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_u32_list(&self.ids);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            ids: fields.next_u32_list(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnemyHitMsg {
    pub enemy_id: u32,
    pub damage: i32,
    pub killed: bool,
    pub shooter: Option<PlayerId>,
}

impl WireMessage for EnemyHitMsg {
    const TAG: &'static str = tags::ENEMY_HIT;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_num(self.enemy_id);
        out.push_num(self.damage);
        out.push_bool(self.killed);
        match &self.shooter {
            Some(shooter) => out.push_id(shooter),
            None => out.push_str(""),
        }
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            enemy_id: fields.next_u32(),
            damage: fields.next_i32(),
            killed: fields.next_bool(),
            shooter: fields.next_optional_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZapMsg {
    pub player_id: PlayerId,
    pub enemy_id: u32,
    pub damage: i32,
}

impl WireMessage for ZapMsg {
    const TAG: &'static str = tags::FORCE_FIELD_ZAP;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_num(self.enemy_id);
        out.push_num(self.damage);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            enemy_id: fields.next_u32(),
            damage: fields.next_i32(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForceFieldMsg {
    pub player_id: PlayerId,
    pub radius: f32,
    pub damage: i32,
    pub cooldown: f32,
    pub chain: u32,
    pub enabled: bool,
}

impl WireMessage for ForceFieldMsg {
    const TAG: &'static str = tags::FORCE_FIELD_PARAMS;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_id(&self.player_id);
        out.push_f32(self.radius);
        out.push_num(self.damage);
        out.push_f32(self.cooldown);
        out.push_num(self.chain);
        out.push_bool(self.enabled);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            player_id: fields.next_id(),
            radius: fields.next_f32(),
            damage: fields.next_i32(),
            cooldown: fields.next_f32(),
            chain: fields.next_u32(),
            enabled: fields.next_bool(),
        }
    }
}

/// One slice of an oversized message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkMsg {
    pub tag: String,
    pub chunk_id: u32,
    pub index: u32,
    pub total: u32,
    pub slice: String,
}

impl WireMessage for ChunkMsg {
    const TAG: &'static str = tags::CHUNK;

    fn write_fields(&self, out: &mut FieldWriter) {
        out.push_str(&self.tag);
        out.push_num(self.chunk_id);
        out.push_num(self.index);
        out.push_num(self.total);
        out.push_raw(&self.slice);
    }

    fn read_fields(fields: &mut FieldReader) -> Self {
        Self {
            tag: fields.next_string(),
            chunk_id: fields.next_u32(),
            index: fields.next_u32(),
            total: fields.next_u32(),
            slice: fields.rest(),
        }
    }
}

/// Transient decode result for one received message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Connect(ConnectMsg),
    Roster(RosterMsg),
    Ready(ReadyMsg),
    Disconnect(DisconnectMsg),
    Movement(MovementMsg),
    Bullet(BulletMsg),
    Death(DeathMsg),
    Respawn(RespawnMsg),
    Damage(DamageMsg),
    KillNotify(KillNotifyMsg),
    EnemySpawn(EnemySpawnMsg),
    EnemySync(EnemySyncMsg),
    EnemyFullSync(EnemyFullSyncMsg),
    EnemyHit(EnemyHitMsg),
    Zap(ZapMsg),
    ForceField(ForceFieldMsg),
    Chunk(ChunkMsg),
}

macro_rules! parsed_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for ParsedMessage {
                fn from(msg: $ty) -> Self {
                    ParsedMessage::$variant(msg)
                }
            }
        )*

        impl ParsedMessage {
            pub fn tag(&self) -> &'static str {
                match self {
                    $(ParsedMessage::$variant(_) => <$ty as WireMessage>::TAG,)*
                }
            }

            pub fn encode(&self) -> String {
                match self {
                    $(ParsedMessage::$variant(msg) => msg.encode(),)*
                }
            }
        }

        /// Parser for a registered tag.
        pub fn parser_for(tag: &str) -> Option<ParseFn> {
            $(
                if tag == <$ty as WireMessage>::TAG {
                    return Some(parse_as::<$ty> as ParseFn);
                }
            )*
            None
        }

        /// Every tag this protocol version understands.
        pub const ALL_TAGS: &[&str] = &[$(<$ty as WireMessage>::TAG),*];
    };
}

parsed_from!(
    Connect(ConnectMsg),
    Roster(RosterMsg),
    Ready(ReadyMsg),
    Disconnect(DisconnectMsg),
    Movement(MovementMsg),
    Bullet(BulletMsg),
    Death(DeathMsg),
    Respawn(RespawnMsg),
    Damage(DamageMsg),
    KillNotify(KillNotifyMsg),
    EnemySpawn(EnemySpawnMsg),
    EnemySync(EnemySyncMsg),
    EnemyFullSync(EnemyFullSyncMsg),
    EnemyHit(EnemyHitMsg),
    Zap(ZapMsg),
    ForceField(ForceFieldMsg),
    Chunk(ChunkMsg),
);

/// Turns the tokens after a tag into a typed record.
pub type ParseFn = fn(&[&str]) -> ParsedMessage;

pub fn parse_as<T: WireMessage + Into<ParsedMessage>>(tokens: &[&str]) -> ParsedMessage {
    T::decode(tokens).into()
}

/// Splits a raw message into its tag and the remaining tokens.
pub fn split_message(text: &str) -> (&str, Vec<&str>) {
    let mut parts = text.split(DELIMITER);
    let tag = parts.next().unwrap_or("");
    (tag, parts.collect())
}

/// Parses a complete message; `None` means the tag is unknown.
pub fn parse_message(text: &str) -> Option<ParsedMessage> {
    let (tag, tokens) = split_message(text);
    parser_for(tag).map(|parse| parse(&tokens))
}
