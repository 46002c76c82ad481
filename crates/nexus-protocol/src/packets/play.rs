//! Play state.

use crate::error::CodecError;
use crate::schema::{FieldBuilder, FieldDescriptor, PrimitiveKind, primitive};
use crate::types::Position;
use crate::value::{Model, ProtocolEnum, Value, Values};

protocol_enum! {
    pub enum GameMode {
        Survival = 0,
        Creative = 1,
        Adventure = 2,
        Spectator = 3,
    }
}

protocol_enum! {
    /// Entries of the `minecraft:dimension_type` registry, in registry order.
    pub enum DimensionType {
        Overworld = 0,
        OverworldCaves = 1,
        TheEnd = 2,
        TheNether = 3,
    }
}

/// Liveness probe sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientboundKeepAlive {
    pub id: i64,
}

/// Reply to [`ClientboundKeepAlive`] carrying the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerboundKeepAlive {
    pub id: i64,
}

impl Model for ClientboundKeepAlive {
    const NAME: &'static str = "ClientboundKeepAlive";

    fn fields() -> Vec<FieldDescriptor> {
        vec![primitive("id", PrimitiveKind::Long)]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::I64(self.id)]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            id: values.take("id")?,
        })
    }
}

impl Model for ServerboundKeepAlive {
    const NAME: &'static str = "ServerboundKeepAlive";

    fn fields() -> Vec<FieldDescriptor> {
        vec![primitive("id", PrimitiveKind::Long)]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::I64(self.id)]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            id: values.take("id")?,
        })
    }
}

packet_identity!(ServerboundKeepAlive, 0x18, Play, ServerBound);
packet_identity!(ClientboundKeepAlive, 0x26, Play, ClientBound);

/// Where the player last died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathLocation {
    pub dimension_name: String,
    pub location: Position,
}

/// Sent once when the connection enters Play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPlay {
    pub entity_id: i32,
    pub is_hardcore: bool,
    pub dimensions: Vec<String>,
    pub max_players: i32,
    pub view_distance: i32,
    pub simulation_distance: i32,
    pub reduced_debug_info: bool,
    pub enable_respawn_screen: bool,
    pub do_limited_crafting: bool,
    pub dimension_type: DimensionType,
    pub dimension_name: String,
    pub hashed_seed: i64,
    pub game_mode: GameMode,
    /// `None` is sent as `-1`.
    pub previous_game_mode: Option<GameMode>,
    pub is_debug: bool,
    pub is_flat: bool,
    pub death_location: Option<DeathLocation>,
    pub portal_cooldown: i32,
    pub enforces_secure_chat: bool,
}

impl Model for LoginPlay {
    const NAME: &'static str = "LoginPlay";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("entity_id", PrimitiveKind::Int),
            primitive("is_hardcore", PrimitiveKind::Bool),
            FieldBuilder::new("dimensions", PrimitiveKind::String).array().build(),
            primitive("max_players", PrimitiveKind::VarInt),
            primitive("view_distance", PrimitiveKind::VarInt),
            primitive("simulation_distance", PrimitiveKind::VarInt),
            primitive("reduced_debug_info", PrimitiveKind::Bool),
            primitive("enable_respawn_screen", PrimitiveKind::Bool),
            primitive("do_limited_crafting", PrimitiveKind::Bool),
            FieldBuilder::new("dimension_type", PrimitiveKind::Int).enumeration().build(),
            primitive("dimension_name", PrimitiveKind::String),
            primitive("hashed_seed", PrimitiveKind::Long),
            FieldBuilder::new("game_mode", PrimitiveKind::Int)
                .enumeration()
                .overwrite(PrimitiveKind::UByte)
                .build(),
            FieldBuilder::new("previous_game_mode", PrimitiveKind::Int)
                .enumeration()
                .overwrite(PrimitiveKind::Byte)
                .build(),
            primitive("is_debug", PrimitiveKind::Bool),
            primitive("is_flat", PrimitiveKind::Bool),
            primitive("has_death_location", PrimitiveKind::Bool),
            FieldBuilder::new("death_dimension_name", PrimitiveKind::String)
                .conditional_on("has_death_location")
                .build(),
            FieldBuilder::new("death_location", PrimitiveKind::Position)
                .conditional_on("has_death_location")
                .build(),
            primitive("portal_cooldown", PrimitiveKind::VarInt),
            primitive("enforces_secure_chat", PrimitiveKind::Bool),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        let death = self.death_location.as_ref();
        vec![
            Value::I32(self.entity_id),
            Value::Bool(self.is_hardcore),
            Value::Array(self.dimensions.iter().map(|d| Value::from(d.as_str())).collect()),
            Value::I32(self.max_players),
            Value::I32(self.view_distance),
            Value::I32(self.simulation_distance),
            Value::Bool(self.reduced_debug_info),
            Value::Bool(self.enable_respawn_screen),
            Value::Bool(self.do_limited_crafting),
            Value::I32(self.dimension_type.ordinal()),
            Value::from(self.dimension_name.as_str()),
            Value::I64(self.hashed_seed),
            Value::I32(self.game_mode.ordinal()),
            Value::I32(self.previous_game_mode.map_or(-1, GameMode::ordinal)),
            Value::Bool(self.is_debug),
            Value::Bool(self.is_flat),
            Value::Bool(death.is_some()),
            Value::from(death.map(|d| d.dimension_name.clone())),
            Value::from(death.map(|d| d.location)),
            Value::I32(self.portal_cooldown),
            Value::Bool(self.enforces_secure_chat),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        let entity_id = values.take("entity_id")?;
        let is_hardcore = values.take("is_hardcore")?;
        let dimensions = values.array("dimensions")?;
        let max_players = values.take("max_players")?;
        let view_distance = values.take("view_distance")?;
        let simulation_distance = values.take("simulation_distance")?;
        let reduced_debug_info = values.take("reduced_debug_info")?;
        let enable_respawn_screen = values.take("enable_respawn_screen")?;
        let do_limited_crafting = values.take("do_limited_crafting")?;
        let dimension_type = values.enumeration("dimension_type")?;
        let dimension_name = values.take("dimension_name")?;
        let hashed_seed = values.take("hashed_seed")?;
        let game_mode = values.enumeration("game_mode")?;
        let previous_ordinal: i32 = values.take("previous_game_mode")?;
        let previous_game_mode = match previous_ordinal {
            -1 => None,
            ordinal => Some(GameMode::from_ordinal(ordinal).ok_or(
                CodecError::InvalidEnumOrdinal {
                    enumeration: GameMode::NAME,
                    ordinal,
                },
            )?),
        };
        let is_debug = values.take("is_debug")?;
        let is_flat = values.take("is_flat")?;
        let _has_death_location: bool = values.take("has_death_location")?;
        let death_dimension_name: Option<String> = values.optional("death_dimension_name")?;
        let death_position: Option<Position> = values.optional("death_location")?;
        let death_location = match (death_dimension_name, death_position) {
            (Some(dimension_name), Some(location)) => Some(DeathLocation {
                dimension_name,
                location,
            }),
            _ => None,
        };

        Ok(Self {
            entity_id,
            is_hardcore,
            dimensions,
            max_players,
            view_distance,
            simulation_distance,
            reduced_debug_info,
            enable_respawn_screen,
            do_limited_crafting,
            dimension_type,
            dimension_name,
            hashed_seed,
            game_mode,
            previous_game_mode,
            is_debug,
            is_flat,
            death_location,
            portal_cooldown: values.take("portal_cooldown")?,
            enforces_secure_chat: values.take("enforces_secure_chat")?,
        })
    }
}

packet_identity!(LoginPlay, 0x2B, Play, ClientBound);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::default_registry;
    use crate::packets::tests::roundtrip;

    fn login_play() -> LoginPlay {
        LoginPlay {
            entity_id: 1,
            is_hardcore: false,
            dimensions: vec!["minecraft:overworld".into()],
            max_players: 20,
            view_distance: 10,
            simulation_distance: 10,
            reduced_debug_info: false,
            enable_respawn_screen: true,
            do_limited_crafting: false,
            dimension_type: DimensionType::Overworld,
            dimension_name: "minecraft:overworld".into(),
            hashed_seed: 0,
            game_mode: GameMode::Creative,
            previous_game_mode: None,
            is_debug: false,
            is_flat: true,
            death_location: None,
            portal_cooldown: 0,
            enforces_secure_chat: false,
        }
    }

    #[test]
    fn test_login_play_without_death_location() {
        let packet = login_play();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_login_play_with_death_location() {
        let packet = LoginPlay {
            previous_game_mode: Some(GameMode::Survival),
            death_location: Some(DeathLocation {
                dimension_name: "minecraft:the_nether".into(),
                location: Position::new(-120, 64, 3_000),
            }),
            ..login_play()
        };
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_death_location_changes_length_only_when_present() {
        let registry = default_registry().unwrap();
        let without = registry.encode(&login_play()).unwrap();
        let with = registry
            .encode(&LoginPlay {
                death_location: Some(DeathLocation {
                    dimension_name: "x".into(),
                    location: Position::default(),
                }),
                ..login_play()
            })
            .unwrap();
        assert_eq!(with.len(), without.len() + 2 + 8);
    }

    #[test]
    fn test_game_mode_widths() {
        let registry = default_registry().unwrap();
        let bytes = registry.encode(&login_play()).unwrap();
        // game_mode (u8) then previous_game_mode (i8 -1), after the hashed seed.
        let seed_end = bytes.len() - 7;
        assert_eq!(&bytes[seed_end - 8..seed_end], &0i64.to_be_bytes());
        assert_eq!(&bytes[seed_end..seed_end + 2], &[0x01, 0xFF]);
    }

    #[test]
    fn test_keep_alive_roundtrip() {
        assert_eq!(roundtrip(&ClientboundKeepAlive { id: i64::MIN }).id, i64::MIN);
        assert_eq!(roundtrip(&ServerboundKeepAlive { id: 77 }).id, 77);
    }
}
