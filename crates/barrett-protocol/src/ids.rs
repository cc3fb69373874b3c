//! 总线 ID 与广播组常量
//!
//! 总线 ID 为 11 bit：
//!
//! ```text
//! bit 10     : 组标志（1 = 广播组 / 反馈组）
//! bit 9..5   : 发送方节点 ID（from）
//! bit 4..0   : 接收方节点 ID 或组号（to）
//! ```
//!
//! 节点 ID 范围 1..=31，0 保留给主机。

use crate::ProtocolError;

/// 最小 Puck 节点 ID
pub const MIN_ID: u32 = 1;
/// 最大 Puck 节点 ID
pub const MAX_ID: u32 = 31;
/// 主机节点 ID
pub const HOST_ID: u32 = 0;

/// 节点 ID 位宽
pub const NODE_ID_WIDTH: u32 = 5;
/// 节点 ID 掩码
pub const NODE_ID_MASK: u32 = 0x1f;

/// 组标志位
pub const GROUP_MASK: u32 = 0x400;
/// 发送方字段掩码
pub const FROM_MASK: u32 = 0x3e0;
/// 接收方字段掩码（包含组标志）
pub const TO_MASK: u32 = 0x41f;

/// 命令字节中的 SET 标志
pub const SET_MASK: u8 = 0x80;
/// 命令字节中的属性 ID 掩码
pub const PROPERTY_MASK: u8 = 0x7f;

// ============================================================================
// 广播组（主机 → Puck）
// ============================================================================

/// 整条总线
pub const BGRP_WHOLE_BUS: u32 = GROUP_MASK;
/// WAM 下臂（关节 1-4）
pub const BGRP_LOWER_WAM: u32 = GROUP_MASK | 1;
/// WAM 上臂（关节 5-7）
pub const BGRP_UPPER_WAM: u32 = GROUP_MASK | 2;
/// WAM 全部关节
pub const BGRP_WAM: u32 = GROUP_MASK | 4;
/// BarrettHand
pub const BGRP_HAND: u32 = GROUP_MASK | 5;

// ============================================================================
// 反馈组（Puck → 主机）
// ============================================================================

/// 电机位置打包应答
pub const FGRP_MOTOR_POSITION: u32 = GROUP_MASK | 3;
/// 标准属性应答
pub const FGRP_OTHER: u32 = GROUP_MASK | 6;
/// 副编码器位置打包应答
pub const FGRP_SECONDARY_POSITION: u32 = GROUP_MASK | 7;

/// 节点 ID（或组 ID）→ 主机发出的总线 ID
#[inline]
pub fn node_id_to_bus_id(id: u32) -> u32 {
    (id & TO_MASK) | (HOST_ID << NODE_ID_WIDTH)
}

/// 组合发送方与接收方得到总线 ID
#[inline]
pub fn encode_bus_id(from: u32, to: u32) -> u32 {
    (to & TO_MASK) | ((from & NODE_ID_MASK) << NODE_ID_WIDTH)
}

/// 从总线 ID 中取出发送方节点 ID
#[inline]
pub fn bus_id_to_from_node(bus_id: u32) -> u32 {
    (bus_id & FROM_MASK) >> NODE_ID_WIDTH
}

/// 从总线 ID 中取出接收方（节点 ID 或组 ID）
#[inline]
pub fn bus_id_to_to_node(bus_id: u32) -> u32 {
    bus_id & TO_MASK
}

/// 是否为组 ID
#[inline]
pub fn is_group_id(id: u32) -> bool {
    id & GROUP_MASK != 0
}

/// 校验 Puck 节点 ID（1..=31）
pub fn validate_node_id(id: u32) -> Result<u32, ProtocolError> {
    if (MIN_ID..=MAX_ID).contains(&id) {
        Ok(id)
    } else {
        Err(ProtocolError::InvalidNodeId { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_to_bus_id() {
        assert_eq!(node_id_to_bus_id(3), 3);
        assert_eq!(node_id_to_bus_id(BGRP_WAM), 0x404);
        // 超出 to 字段的位被丢弃
        assert_eq!(node_id_to_bus_id(0x3e3), 3);
    }

    #[test]
    fn test_encode_decode_bus_id() {
        let bus_id = encode_bus_id(3, FGRP_OTHER);
        assert_eq!(bus_id, 0x466);
        assert_eq!(bus_id_to_from_node(bus_id), 3);
        assert_eq!(bus_id_to_to_node(bus_id), FGRP_OTHER);
        assert!(is_group_id(bus_id));

        let bus_id = encode_bus_id(31, FGRP_MOTOR_POSITION);
        assert_eq!(bus_id_to_from_node(bus_id), 31);
        assert_eq!(bus_id_to_to_node(bus_id), FGRP_MOTOR_POSITION);
    }

    #[test]
    fn test_validate_node_id() {
        assert!(validate_node_id(0).is_err());
        assert_eq!(validate_node_id(1), Ok(1));
        assert_eq!(validate_node_id(31), Ok(31));
        assert_eq!(
            validate_node_id(32),
            Err(ProtocolError::InvalidNodeId { id: 32 })
        );
    }

    #[test]
    fn test_group_constants() {
        assert!(is_group_id(BGRP_LOWER_WAM));
        assert!(is_group_id(BGRP_UPPER_WAM));
        assert!(!is_group_id(7));
        assert_ne!(FGRP_OTHER, FGRP_MOTOR_POSITION);
    }
}
