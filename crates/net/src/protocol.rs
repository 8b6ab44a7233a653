//! Network protocol message types
//!
//! All messages are JSON-serialized and carried in the 2-byte-header
//! envelope of `frame`. The catalog is split by direction; shared model
//! types (cards, room specs, failure reasons) come from draftden-core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use draftden_core::card::{BasicLand, Card, PackId, Zone};
use draftden_core::config::RoomSpec;
use draftden_core::validate::CreateRoomFailure;

/// Bumped when the message catalog changes incompatibly. Clients with a
/// different major version are refused at login.
pub const PROTOCOL_VERSION_MAJOR: u32 = 1;
pub const PROTOCOL_VERSION_MINOR: u32 = 0;

/// Login outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginResult {
    Success,
    FailureNameInUse,
    FailureIncompatibleProtoVer,
    FailureInvalidName,
}

impl LoginResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginResult::Success)
    }
}

/// Where to obtain a compatible client, carried on proto-version refusals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDownloadInfo {
    pub description: String,
    pub url: String,
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRoomFailure {
    RoomFull,
    InvalidPassword,
    NoSuchRoom,
    NotDeparted,
}

/// Chat visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatScope {
    All,
    Room,
}

/// Client-visible chair lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupantState {
    Standby,
    Ready,
    Active,
    Departed,
}

/// One occupied chair in a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantInfo {
    pub chair_index: usize,
    pub name: String,
    pub is_bot: bool,
    pub state: OccupantState,
}

/// One set the server can draft, for the create-room dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCapability {
    pub code: String,
    pub name: String,
    pub booster_generation: bool,
}

/// A room entry in the server directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: u32,
    pub player_count: usize,
    /// Abridged: bulky config details are stripped for the directory.
    pub room_config: RoomSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCountUpdate {
    pub room_id: u32,
    pub player_count: usize,
}

/// Draft lifecycle stage as shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStage {
    New,
    Running,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub round: usize,
    /// Set while the post-round grace timer runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_round_time_remaining_millis: Option<u32>,
}

/// Per-seat draft status inside `BoosterDraftStateInd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChairDraftState {
    pub chair_index: usize,
    pub queued_packs: usize,
    /// Selection timer, -1 when disabled.
    pub time_remaining: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChairDeckInfo {
    pub chair_index: usize,
    pub deck_hash: String,
}

/// One face-up card of a grid round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCardInfo {
    pub card: Card,
    /// Chair that took the card, -1 while unselected.
    pub selected_chair_index: i32,
    /// Monotone selection order, -1 while unselected.
    pub selected_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftedCard {
    pub card: Card,
    pub zone: Zone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicLandQuantity {
    pub land: BasicLand,
    pub zone: Zone,
    pub quantity: u32,
}

/// A client-requested inventory move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMove {
    pub card: Card,
    pub from: Zone,
    pub to: Zone,
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientToServer {
    LoginReq {
        name: String,
        protocol_version_major: u32,
        protocol_version_minor: u32,
        client_version: String,
    },
    ChatMessageInd {
        scope: ChatScope,
        text: String,
    },
    CreateRoomReq {
        room_config: RoomSpec,
    },
    JoinRoomReq {
        room_id: u32,
        #[serde(default)]
        password: Option<String>,
    },
    DepartRoomInd {},
    PlayerReadyInd {
        ready: bool,
    },
    PlayerCardSelectionReq {
        pack_id: PackId,
        card: Card,
        zone: Zone,
    },
    PlayerAutoCardSelectionReq {
        pack_id: PackId,
        card: Card,
    },
    PlayerInventoryUpdateInd {
        #[serde(default)]
        moves: Vec<CardMove>,
        #[serde(default)]
        basic_lands: Vec<BasicLandQuantity>,
    },
    KeepAliveInd {},
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerToClient {
    GreetingInd {
        protocol_version_major: u32,
        protocol_version_minor: u32,
        server_name: String,
        server_version: String,
    },
    LoginRsp {
        result: LoginResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_download_info: Option<ClientDownloadInfo>,
    },
    AnnouncementsInd {
        text: String,
    },
    AlertsInd {
        text: String,
    },
    RoomCapabilitiesInd {
        sets: Vec<SetCapability>,
    },
    RoomsInfoInd {
        #[serde(default)]
        added_rooms: Vec<RoomSummary>,
        #[serde(default)]
        removed_rooms: Vec<u32>,
        #[serde(default)]
        player_counts: Vec<PlayerCountUpdate>,
    },
    UsersInfoInd {
        #[serde(default)]
        added_users: Vec<String>,
        #[serde(default)]
        removed_users: Vec<String>,
    },
    ChatMessageDeliveryInd {
        sender: String,
        scope: ChatScope,
        text: String,
        timestamp: DateTime<Utc>,
    },
    CreateRoomSuccessRsp {
        room_id: u32,
    },
    CreateRoomFailureRsp {
        result: CreateRoomFailure,
    },
    JoinRoomSuccessRspInd {
        room_id: u32,
        rejoin: bool,
        chair_idx: usize,
        room_config: RoomSpec,
    },
    JoinRoomFailureRsp {
        result: JoinRoomFailure,
        room_id: u32,
    },
    RoomOccupantsInfoInd {
        room_id: u32,
        players: Vec<OccupantInfo>,
    },
    BoosterDraftStateInd {
        millis_until_next_sec: u32,
        chairs: Vec<ChairDraftState>,
    },
    RoomStageInd {
        stage: RoomStage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round_info: Option<RoundInfo>,
    },
    RoomChairsDeckInfoInd {
        chairs: Vec<ChairDeckInfo>,
    },
    PublicStateInd {
        pack_id: PackId,
        card_states: Vec<PublicCardInfo>,
        active_chair_index: usize,
        time_remaining_secs: i32,
        millis_until_next_sec: u32,
    },
    PlayerInventoryInd {
        drafted_cards: Vec<DraftedCard>,
        #[serde(default)]
        basic_lands: Vec<BasicLandQuantity>,
    },
    PlayerCurrentPackInd {
        pack_id: PackId,
        cards: Vec<Card>,
    },
    PlayerCardSelectionRsp {
        result: bool,
        pack_id: PackId,
        card: Card,
    },
    PlayerAutoCardSelectionInd {
        pack_id: PackId,
        card: Card,
    },
    RoomErrorInd {},
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftden_core::config::{
        Dispensation, DispenseQuantity, DispenserConfig, DraftConfig, PassDirection, RoundConfig,
    };

    fn roundtrip_c2s(msg: &ClientToServer) {
        let bytes = serde_json::to_vec(msg).unwrap();
        let back: ClientToServer = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(&back, msg);
    }

    fn roundtrip_s2c(msg: &ServerToClient) {
        let bytes = serde_json::to_vec(msg).unwrap();
        let back: ServerToClient = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(&back, msg);
    }

    #[test]
    fn login_roundtrip() {
        roundtrip_c2s(&ClientToServer::LoginReq {
            name: "alice".into(),
            protocol_version_major: PROTOCOL_VERSION_MAJOR,
            protocol_version_minor: PROTOCOL_VERSION_MINOR,
            client_version: "0.1.0".into(),
        });
        roundtrip_s2c(&ServerToClient::LoginRsp {
            result: LoginResult::FailureIncompatibleProtoVer,
            client_download_info: Some(ClientDownloadInfo {
                description: "Get the latest client".into(),
                url: "https://example.invalid/download".into(),
            }),
        });
    }

    #[test]
    fn create_room_roundtrip() {
        let spec = RoomSpec {
            name: "draft night".into(),
            password: Some("pw".into()),
            bot_count: 2,
            draft_config: DraftConfig {
                chair_count: 4,
                rounds: vec![RoundConfig::Booster {
                    selection_time_secs: 30,
                    pass_direction: PassDirection::Clockwise,
                    dispensations: vec![Dispensation {
                        dispenser_index: 0,
                        chair_indices: vec![0, 1, 2, 3],
                        quantity: DispenseQuantity::Count(15),
                    }],
                }],
                dispensers: vec![DispenserConfig {
                    booster_set_codes: vec!["10E".into()],
                    custom_card_list_index: None,
                }],
                custom_card_lists: vec![],
                post_round_timer_secs: 5,
                version: 1,
            },
        };
        roundtrip_c2s(&ClientToServer::CreateRoomReq { room_config: spec });
        roundtrip_s2c(&ServerToClient::CreateRoomFailureRsp {
            result: CreateRoomFailure::InvalidSetCode,
        });
    }

    #[test]
    fn draft_indications_roundtrip() {
        roundtrip_s2c(&ServerToClient::BoosterDraftStateInd {
            millis_until_next_sec: 420,
            chairs: vec![ChairDraftState {
                chair_index: 0,
                queued_packs: 2,
                time_remaining: 17,
            }],
        });
        roundtrip_s2c(&ServerToClient::RoomStageInd {
            stage: RoomStage::Running,
            round_info: Some(RoundInfo {
                round: 1,
                post_round_time_remaining_millis: Some(4200),
            }),
        });
        roundtrip_s2c(&ServerToClient::PublicStateInd {
            pack_id: PackId(9),
            card_states: vec![PublicCardInfo {
                card: Card::new("TST", "Alpha"),
                selected_chair_index: -1,
                selected_order: -1,
            }],
            active_chair_index: 1,
            time_remaining_secs: -1,
            millis_until_next_sec: 999,
        });
    }

    #[test]
    fn inventory_messages_roundtrip() {
        roundtrip_c2s(&ClientToServer::PlayerInventoryUpdateInd {
            moves: vec![CardMove {
                card: Card::new("TST", "Alpha"),
                from: Zone::Auto,
                to: Zone::Main,
            }],
            basic_lands: vec![BasicLandQuantity {
                land: BasicLand::Forest,
                zone: Zone::Main,
                quantity: 8,
            }],
        });
        roundtrip_s2c(&ServerToClient::PlayerInventoryInd {
            drafted_cards: vec![DraftedCard {
                card: Card::new("TST", "Alpha"),
                zone: Zone::Main,
            }],
            basic_lands: vec![],
        });
    }

    #[test]
    fn tag_is_the_message_name() {
        let json = serde_json::to_string(&ClientToServer::KeepAliveInd {}).unwrap();
        assert!(json.contains("\"type\":\"KeepAliveInd\""));
    }
}
