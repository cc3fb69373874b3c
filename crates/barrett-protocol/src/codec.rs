//! 请求帧构建与应答帧解析
//!
//! # 帧格式
//!
//! ```text
//! GET 请求   : [prop]                                        1 字节
//! SET 请求   : [prop|0x80, 0, v0, v1, v2, v3]                6 字节，值为小端 i32
//! 标准应答   : [prop|0x80, 0, v0, v1 (, v2, v3)]             4 或 6 字节
//! 打包位置   : [..PPPPPP, PPPPPPPP, PPPPPPPP (, 副编码器)]   3 或 6 字节，22-bit 有符号
//! 打包力矩   : ATPPPPPP AAAAAAaa aaaaaaBB BBBBbbbb bbbbCCCC CCcccccc ccDDDDDD dddddddd
//! ```
//!
//! 打包力矩中 `A`..`D` 为四个 14-bit 有符号值（大写为高位）。

use crate::{
    BarrettFrame, FGRP_MOTOR_POSITION, FGRP_OTHER, PROPERTY_MASK, ProtocolError, SET_MASK,
    encode_bus_id, node_id_to_bus_id,
};

/// 单个打包力矩帧最多携带的关节数
pub const PUCKS_PER_TORQUE_GROUP: usize = 4;

/// 打包力矩的饱和值（14-bit 有符号）
pub const MAX_PUCK_TORQUE: i32 = 8191;

/// 构建 GET 请求
///
/// `to` 可以是节点 ID，也可以是广播组 ID。
pub fn encode_get_request(to: u32, prop_id: u8) -> BarrettFrame {
    BarrettFrame::new(node_id_to_bus_id(to), &[prop_id & PROPERTY_MASK])
}

/// 构建 SET 请求
pub fn encode_set_request(to: u32, prop_id: u8, value: i32) -> BarrettFrame {
    let v = value.to_le_bytes();
    BarrettFrame::new(
        node_id_to_bus_id(to),
        &[(prop_id & PROPERTY_MASK) | SET_MASK, 0, v[0], v[1], v[2], v[3]],
    )
}

/// 节点的标准应答所使用的总线 ID
#[inline]
pub fn standard_reply_bus_id(node_id: u32) -> u32 {
    encode_bus_id(node_id, FGRP_OTHER)
}

/// 节点的打包位置应答所使用的总线 ID
#[inline]
pub fn position_reply_bus_id(node_id: u32) -> u32 {
    encode_bus_id(node_id, FGRP_MOTOR_POSITION)
}

/// 解析标准应答
///
/// # 校验
///
/// - 长度必须为 4 或 6
/// - 第 0 字节必须带 SET 标志，且属性 ID 与请求一致
/// - 第 1 字节必须为 0
///
/// # 返回
///
/// 第 2 字节起的小端有符号整数（按最高字节符号扩展）
pub fn parse_standard_reply(prop_id: u8, data: &[u8]) -> Result<i32, ProtocolError> {
    let len = data.len();
    if len != 4 && len != 6 {
        return Err(ProtocolError::InvalidLength {
            expected: "4 or 6",
            actual: len,
        });
    }
    if data[0] & SET_MASK == 0 {
        return Err(ProtocolError::InvalidCommandBit { byte: data[0] });
    }
    let actual = data[0] & PROPERTY_MASK;
    let expected = prop_id & PROPERTY_MASK;
    if actual != expected {
        return Err(ProtocolError::PropertyMismatch { expected, actual });
    }
    if data[1] != 0 {
        return Err(ProtocolError::ReservedByteNotZero { value: data[1] });
    }

    let mut value: i32 = if data[len - 1] & 0x80 != 0 { -1 } else { 0 };
    for &byte in data[2..].iter().rev() {
        value = (value << 8) | byte as i32;
    }
    Ok(value)
}

/// 构建标准应答（Puck 端，用于仿真与测试）
///
/// `len` 为 4 时只携带低 16 位。
pub fn encode_standard_reply(node_id: u32, prop_id: u8, value: i32, len: usize) -> BarrettFrame {
    let v = value.to_le_bytes();
    let full = [(prop_id & PROPERTY_MASK) | SET_MASK, 0, v[0], v[1], v[2], v[3]];
    let len = if len == 4 { 4 } else { 6 };
    BarrettFrame::new(standard_reply_bus_id(node_id), &full[..len])
}

/// 解析打包位置应答（22-bit 有符号编码器计数）
pub fn parse_position_reply(data: &[u8]) -> Result<i32, ProtocolError> {
    let len = data.len();
    if len != 3 && len != 6 {
        return Err(ProtocolError::InvalidLength {
            expected: "3 or 6",
            actual: len,
        });
    }

    let mut value: i32 = ((data[0] as i32) << 16) & 0x003F_0000;
    value |= (data[1] as i32) << 8;
    value |= data[2] as i32;

    if value & 0x0020_0000 != 0 {
        // 符号扩展
        value |= !0x003F_FFFF;
    }
    Ok(value)
}

/// 构建打包位置应答（Puck 端，用于仿真与测试）
pub fn encode_position_reply(node_id: u32, counts: i32) -> BarrettFrame {
    let data = [
        ((counts >> 16) & 0x3F) as u8,
        ((counts >> 8) & 0xFF) as u8,
        (counts & 0xFF) as u8,
    ];
    BarrettFrame::new(position_reply_bus_id(node_id), &data)
}

/// 构建打包力矩帧
///
/// 每个值先饱和到 ±[`MAX_PUCK_TORQUE`] 再向下取整；不足 4 个的位置补 0。
///
/// # 错误
///
/// - `ProtocolError::TooManyTorques`: 超过 4 个值
pub fn encode_packed_torques(
    group_id: u32,
    prop_id: u8,
    torques: &[f64],
) -> Result<BarrettFrame, ProtocolError> {
    if torques.len() > PUCKS_PER_TORQUE_GROUP {
        return Err(ProtocolError::TooManyTorques {
            count: torques.len(),
        });
    }

    let mut t = [0i32; PUCKS_PER_TORQUE_GROUP];
    for (dst, &src) in t.iter_mut().zip(torques) {
        *dst = saturate_torque(src);
    }

    let data = [
        (prop_id & PROPERTY_MASK) | SET_MASK,
        ((t[0] >> 6) & 0xFF) as u8,
        (((t[0] << 2) & 0xFC) | ((t[1] >> 12) & 0x03)) as u8,
        ((t[1] >> 4) & 0xFF) as u8,
        (((t[1] << 4) & 0xF0) | ((t[2] >> 10) & 0x0F)) as u8,
        ((t[2] >> 2) & 0xFF) as u8,
        (((t[2] << 6) & 0xC0) | ((t[3] >> 8) & 0x3F)) as u8,
        (t[3] & 0xFF) as u8,
    ];
    Ok(BarrettFrame::new(node_id_to_bus_id(group_id), &data))
}

/// 解析打包力矩帧（Puck 端，用于仿真与测试）
///
/// # 返回
///
/// `(属性 ID, 四个 14-bit 有符号值)`
pub fn decode_packed_torques(data: &[u8]) -> Result<(u8, [i32; 4]), ProtocolError> {
    if data.len() != 8 {
        return Err(ProtocolError::InvalidLength {
            expected: "8",
            actual: data.len(),
        });
    }
    if data[0] & SET_MASK == 0 {
        return Err(ProtocolError::InvalidCommandBit { byte: data[0] });
    }

    let d: [i32; 8] = std::array::from_fn(|i| data[i] as i32);
    let raw = [
        (d[1] << 6) | (d[2] >> 2),
        ((d[2] & 0x03) << 12) | (d[3] << 4) | (d[4] >> 4),
        ((d[4] & 0x0F) << 10) | (d[5] << 2) | (d[6] >> 6),
        ((d[6] & 0x3F) << 8) | d[7],
    ];
    Ok((data[0] & PROPERTY_MASK, raw.map(sign_extend_14)))
}

#[inline]
fn saturate_torque(value: f64) -> i32 {
    let max = MAX_PUCK_TORQUE as f64;
    value.clamp(-max, max).floor() as i32
}

#[inline]
fn sign_extend_14(value: i32) -> i32 {
    if value & 0x2000 != 0 {
        value - 0x4000
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BGRP_LOWER_WAM, FGRP_OTHER};
    use proptest::prelude::*;

    #[test]
    fn test_get_request_layout() {
        let frame = encode_get_request(3, 0x85);
        assert_eq!(frame.id, 3);
        // SET 位被清除
        assert_eq!(frame.data_slice(), &[0x05]);
    }

    #[test]
    fn test_set_request_layout() {
        let frame = encode_set_request(4, 48, -2);
        assert_eq!(frame.id, 4);
        assert_eq!(frame.data_slice(), &[48 | 0x80, 0, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_parse_standard_reply_four_bytes() {
        // 16-bit 负数按最高字节符号扩展
        let value = parse_standard_reply(5, &[0x85, 0, 0x00, 0x80]).unwrap();
        assert_eq!(value, -32768);

        let value = parse_standard_reply(5, &[0x85, 0, 0x02, 0x00]).unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_parse_standard_reply_six_bytes() {
        let value = parse_standard_reply(68, &[68 | 0x80, 0, 0x00, 0x10, 0x00, 0x00]).unwrap();
        assert_eq!(value, 4096);
    }

    #[test]
    fn test_parse_standard_reply_rejects_bad_framing() {
        assert_eq!(
            parse_standard_reply(5, &[0x85, 0, 1]),
            Err(ProtocolError::InvalidLength {
                expected: "4 or 6",
                actual: 3
            })
        );
        assert_eq!(
            parse_standard_reply(5, &[0x05, 0, 1, 0]),
            Err(ProtocolError::InvalidCommandBit { byte: 0x05 })
        );
        assert_eq!(
            parse_standard_reply(5, &[0x86, 0, 1, 0]),
            Err(ProtocolError::PropertyMismatch {
                expected: 5,
                actual: 6
            })
        );
        assert_eq!(
            parse_standard_reply(5, &[0x85, 1, 1, 0]),
            Err(ProtocolError::ReservedByteNotZero { value: 1 })
        );
    }

    #[test]
    fn test_standard_reply_encoder_matches_parser() {
        let frame = encode_standard_reply(7, 48, -123456, 6);
        assert_eq!(frame.id, encode_bus_id(7, FGRP_OTHER));
        assert_eq!(parse_standard_reply(48, frame.data_slice()), Ok(-123456));
    }

    #[test]
    fn test_parse_position_reply_sign_extension() {
        assert_eq!(parse_position_reply(&[0x3F, 0xFF, 0xFF]), Ok(-1));
        assert_eq!(parse_position_reply(&[0x20, 0x00, 0x00]), Ok(-0x20_0000));
        assert_eq!(parse_position_reply(&[0x1F, 0xFF, 0xFF]), Ok(0x1F_FFFF));
        // 高两位被忽略
        assert_eq!(parse_position_reply(&[0xC0, 0x00, 0x01]), Ok(1));
        assert!(parse_position_reply(&[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_packed_torques_known_layout() {
        let frame = encode_packed_torques(BGRP_LOWER_WAM, 42, &[1.0, -1.0, 8191.0, -8192.0]).unwrap();
        assert_eq!(frame.id, BGRP_LOWER_WAM);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data[0], 42 | 0x80);
        // A = 1 → 00000000 000001..
        assert_eq!(frame.data[1], 0x00);
        assert_eq!(frame.data[2] & 0xFC, 0x04);

        let (prop, torques) = decode_packed_torques(frame.data_slice()).unwrap();
        assert_eq!(prop, 42);
        // -8192 饱和到 -8191
        assert_eq!(torques, [1, -1, 8191, -8191]);
    }

    #[test]
    fn test_packed_torques_pads_missing_values() {
        let frame = encode_packed_torques(BGRP_LOWER_WAM, 42, &[100.7, -3.5, 20.0]).unwrap();
        let (_, torques) = decode_packed_torques(frame.data_slice()).unwrap();
        // floor: 100.7 → 100, -3.5 → -4
        assert_eq!(torques, [100, -4, 20, 0]);
    }

    #[test]
    fn test_packed_torques_rejects_more_than_four() {
        let err = encode_packed_torques(BGRP_LOWER_WAM, 42, &[0.0; 5]).unwrap_err();
        assert_eq!(err, ProtocolError::TooManyTorques { count: 5 });
    }

    proptest! {
        // 任意输入经过打包后都等于饱和 + 向下取整的结果
        #[test]
        fn prop_packed_torques_saturate_and_floor(
            values in proptest::collection::vec(-20000.0f64..20000.0, 0..=4)
        ) {
            let frame = encode_packed_torques(BGRP_LOWER_WAM, 42, &values).unwrap();
            let (_, decoded) = decode_packed_torques(frame.data_slice()).unwrap();
            for (i, expected) in values.iter().enumerate() {
                let expected = expected.clamp(-8191.0, 8191.0).floor() as i32;
                prop_assert_eq!(decoded[i], expected);
            }
            for value in decoded.iter().skip(values.len()) {
                prop_assert_eq!(*value, 0);
            }
        }
    }
}
