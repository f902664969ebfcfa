//! Fixed GATT identifiers for the FlexGlove peripheral.
//!
//! These must match the glove firmware's advertised GATT layout exactly; a
//! mismatch is a terminal discovery failure, never a retry condition.

use uuid::Uuid;

/// Primary GATT service exposed by the glove firmware.
pub const GLOVE_SERVICE: Uuid = Uuid::from_u128(0xa7f3c9e1_4b2d_8f6a_1c3e_9d5b7a2f4e8c);

/// Notify-only data characteristic carrying sensor frames.
pub const GLOVE_DATA_CHARACTERISTIC: Uuid =
   Uuid::from_u128(0xd8e4f2a6_3c1b_7e9d_2a4f_6c8b1e3d5a7f);

/// Standard Client Characteristic Configuration descriptor (0x2902).
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid =
   Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD value that enables notification delivery.
pub const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];
