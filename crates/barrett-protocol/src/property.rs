//! Puck 属性定义
//!
//! 同一个属性在不同类型的 Puck 固件上使用不同的数值 ID，
//! 这里按 Puck 类型给出属性表，由 [`property_id`] 查询。
//! 未出现在表中的组合表示该固件不支持此属性。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Puck 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// 固件版本
    Vers,
    /// 角色（产品类型 + 选项位）
    Role,
    /// 序列号
    Sn,
    /// 节点 ID
    Id,
    /// 错误码
    Error,
    /// 状态（0 = Reset/Monitor，2 = Ready）
    Stat,
    /// 内存地址
    Addr,
    /// 内存值
    Value,
    /// 工作模式
    Mode,
    /// 温度
    Temp,
    /// 力矩命令（电流）
    T,
    /// 最大力矩
    Mt,
    /// 速度
    V,
    /// 最大速度
    Mv,
    /// 位置（编码器计数）
    P,
    /// 电机偏移
    Mofst,
    /// 绝对编码器读数
    Mech,
    /// 每转计数
    Cts,
    /// 每牛米电流（current per Nm）
    Ipnm,
    /// WAM 已归零标志
    Zero,
    /// 示教器状态
    Pen,
    /// 忽略接下来若干次故障
    Ifault,
    /// 速度警告限值
    Vl1,
    /// 速度故障限值
    Vl2,
    /// 力矩警告限值
    Tl1,
    /// 力矩故障限值
    Tl2,
}

impl Property {
    /// 全部属性
    pub const ALL: [Property; 26] = [
        Property::Vers,
        Property::Role,
        Property::Sn,
        Property::Id,
        Property::Error,
        Property::Stat,
        Property::Addr,
        Property::Value,
        Property::Mode,
        Property::Temp,
        Property::T,
        Property::Mt,
        Property::V,
        Property::Mv,
        Property::P,
        Property::Mofst,
        Property::Mech,
        Property::Cts,
        Property::Ipnm,
        Property::Zero,
        Property::Pen,
        Property::Ifault,
        Property::Vl1,
        Property::Vl2,
        Property::Tl1,
        Property::Tl2,
    ];

    /// 反查：某类型固件上数值 ID 对应的属性
    pub fn from_id(puck_type: PuckType, id: u8) -> Option<Property> {
        Property::ALL
            .into_iter()
            .find(|&prop| lookup(puck_type, prop) == Some(id))
    }

    /// 属性名（与固件命名一致，用于日志）
    pub const fn name(self) -> &'static str {
        match self {
            Property::Vers => "VERS",
            Property::Role => "ROLE",
            Property::Sn => "SN",
            Property::Id => "ID",
            Property::Error => "ERROR",
            Property::Stat => "STAT",
            Property::Addr => "ADDR",
            Property::Value => "VALUE",
            Property::Mode => "MODE",
            Property::Temp => "TEMP",
            Property::T => "T",
            Property::Mt => "MT",
            Property::V => "V",
            Property::Mv => "MV",
            Property::P => "P",
            Property::Mofst => "MOFST",
            Property::Mech => "MECH",
            Property::Cts => "CTS",
            Property::Ipnm => "IPNM",
            Property::Zero => "ZERO",
            Property::Pen => "PEN",
            Property::Ifault => "IFAULT",
            Property::Vl1 => "VL1",
            Property::Vl2 => "VL2",
            Property::Tl1 => "TL1",
            Property::Tl2 => "TL2",
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Puck 类型（决定使用哪张属性表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PuckType {
    /// 处于 Monitor（bootloader）固件
    Monitor = 0,
    /// 安全模块
    Safety = 1,
    /// 电机控制器
    Motor = 2,
    /// 六维力传感器
    ForceTorque = 3,
    /// 未知角色
    Unknown = 4,
}

impl PuckType {
    pub const fn name(self) -> &'static str {
        match self {
            PuckType::Monitor => "Monitor",
            PuckType::Safety => "Safety",
            PuckType::Motor => "Motor",
            PuckType::ForceTorque => "ForceTorque",
            PuckType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for PuckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// STAT 属性取值
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum PuckStatus {
    /// 复位后停留在 Monitor 固件
    Reset = 0,
    /// 错误
    Error = 1,
    /// 主固件运行中
    Ready = 2,
}

/// 查询属性 ID
///
/// # 错误
///
/// - `ProtocolError::UnknownProperty`: 该类型的固件不支持此属性
pub fn property_id(puck_type: PuckType, property: Property) -> Result<u8, ProtocolError> {
    lookup(puck_type, property).ok_or(ProtocolError::UnknownProperty {
        property: property.name(),
        puck_type: puck_type.name(),
    })
}

/// 该类型的固件是否支持此属性
pub fn responds_to(puck_type: PuckType, property: Property) -> bool {
    lookup(puck_type, property).is_some()
}

fn lookup(puck_type: PuckType, property: Property) -> Option<u8> {
    use Property::*;

    // 所有固件（包括 Monitor）共有的属性
    let common = match property {
        Vers => Some(0),
        Role => Some(1),
        Sn => Some(2),
        Id => Some(3),
        Error => Some(4),
        Stat => Some(5),
        Addr => Some(6),
        Value => Some(7),
        _ => None,
    };
    if common.is_some() {
        return common;
    }

    match (puck_type, property) {
        (PuckType::Motor, Mode) => Some(8),
        (PuckType::Motor, Temp) => Some(9),
        (PuckType::Motor, T) => Some(42),
        (PuckType::Motor, Mt) => Some(43),
        (PuckType::Motor, V) => Some(44),
        (PuckType::Motor, Mv) => Some(45),
        (PuckType::Motor, P) => Some(48),
        (PuckType::Motor, Mofst) => Some(61),
        (PuckType::Motor, Mech) => Some(66),
        (PuckType::Motor, Cts) => Some(68),
        (PuckType::Motor, Ipnm) => Some(71),

        (PuckType::Safety, Mode) => Some(8),
        (PuckType::Safety, Zero) => Some(41),
        (PuckType::Safety, Pen) => Some(42),
        (PuckType::Safety, Ifault) => Some(43),
        (PuckType::Safety, Vl1) => Some(44),
        (PuckType::Safety, Vl2) => Some(45),
        (PuckType::Safety, Tl1) => Some(46),
        (PuckType::Safety, Tl2) => Some(47),

        (PuckType::ForceTorque, Mode) => Some(8),
        (PuckType::ForceTorque, Temp) => Some(9),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_properties_on_every_type() {
        for pt in [
            PuckType::Monitor,
            PuckType::Safety,
            PuckType::Motor,
            PuckType::ForceTorque,
            PuckType::Unknown,
        ] {
            assert_eq!(property_id(pt, Property::Vers), Ok(0));
            assert_eq!(property_id(pt, Property::Stat), Ok(5));
        }
    }

    #[test]
    fn test_monitor_lacks_motor_properties() {
        // Monitor 固件不暴露位置/力矩
        assert!(!responds_to(PuckType::Monitor, Property::P));
        assert!(!responds_to(PuckType::Monitor, Property::T));
        let err = property_id(PuckType::Monitor, Property::P).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownProperty {
                property: "P",
                puck_type: "Monitor"
            }
        );
    }

    #[test]
    fn test_property_ids_fit_in_seven_bits() {
        for prop in [
            Property::T,
            Property::P,
            Property::Cts,
            Property::Ipnm,
            Property::Mech,
            Property::Zero,
            Property::Tl2,
        ] {
            for pt in [PuckType::Motor, PuckType::Safety] {
                if let Ok(id) = property_id(pt, prop) {
                    assert!(id <= crate::PROPERTY_MASK);
                }
            }
        }
    }

    #[test]
    fn test_reverse_lookup() {
        let id = property_id(PuckType::Motor, Property::Cts).unwrap();
        assert_eq!(Property::from_id(PuckType::Motor, id), Some(Property::Cts));
        // 同一个数值在安全模块上是另一个属性（或不存在）
        assert_ne!(Property::from_id(PuckType::Safety, id), Some(Property::Cts));
        assert_eq!(Property::from_id(PuckType::Monitor, 48), None);
    }

    #[test]
    fn test_puck_status_from_primitive() {
        assert!(matches!(PuckStatus::try_from(0), Ok(PuckStatus::Reset)));
        assert!(matches!(PuckStatus::try_from(2), Ok(PuckStatus::Ready)));
        assert!(PuckStatus::try_from(7).is_err());
        assert_eq!(i32::from(PuckStatus::Ready), 2);
    }

    #[test]
    fn test_puck_type_display() {
        assert_eq!(PuckType::ForceTorque.to_string(), "ForceTorque");
        assert_eq!(u8::from(PuckType::Motor), 2);
        assert!(matches!(PuckType::try_from(1u8), Ok(PuckType::Safety)));
    }
}
