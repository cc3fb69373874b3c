//! ROLE 寄存器位域
//!
//! ```text
//! bit 0..4  : 产品（TATER / GIMBALS / SAFETY / WRAPTOR / TRIGGER / BHAND / FORCE）
//! bit 5..7  : 保留
//! bit 8     : 串口上的磁编码器（绝对编码器）
//! bit 9     : Hall 接口上的磁编码器
//! bit 10    : 编码器接口上的磁编码器
//! bit 11    : 应变片
//! bit 12    : 触觉传感器
//! bit 13    : IMU
//! bit 14    : 编码器接口上的光学编码器
//! bit 15    : 保留
//! ```

use crate::PuckType;
use bilge::prelude::*;

/// 产品字段掩码
pub const ROLE_MASK: i32 = 0x1f;

/// ROLE 中的产品编号
pub mod product {
    pub const TATER: u8 = 0;
    pub const GIMBALS: u8 = 1;
    pub const SAFETY: u8 = 2;
    pub const WRAPTOR: u8 = 3;
    pub const TRIGGER: u8 = 4;
    pub const BHAND: u8 = 5;
    pub const FORCE: u8 = 6;
}

/// ROLE 选项位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleOption {
    MagEncOnSerial,
    MagEncOnHall,
    MagEncOnEnc,
    Strain,
    Tact,
    Imu,
    OpticalEncOnEnc,
}

/// ROLE 寄存器（16 bit，LSB first）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
pub struct PuckRole {
    pub product: u5,
    pub reserved: u3,
    pub mag_enc_on_serial: bool,
    pub mag_enc_on_hall: bool,
    pub mag_enc_on_enc: bool,
    pub strain: bool,
    pub tact: bool,
    pub imu: bool,
    pub optical_enc_on_enc: bool,
    pub spare: bool,
}

impl PuckRole {
    /// 从 ROLE 属性值构造（高 16 位被忽略）
    pub fn from_raw(raw: i32) -> Self {
        PuckRole::from(raw as u16)
    }

    /// 根据产品编号推断 Puck 类型
    pub fn puck_type(&self) -> PuckType {
        match self.product().value() {
            product::SAFETY => PuckType::Safety,
            product::TATER | product::BHAND | product::WRAPTOR => PuckType::Motor,
            product::FORCE => PuckType::ForceTorque,
            _ => PuckType::Unknown,
        }
    }

    /// 是否带有某个选项
    pub fn has_option(&self, option: RoleOption) -> bool {
        match option {
            RoleOption::MagEncOnSerial => self.mag_enc_on_serial(),
            RoleOption::MagEncOnHall => self.mag_enc_on_hall(),
            RoleOption::MagEncOnEnc => self.mag_enc_on_enc(),
            RoleOption::Strain => self.strain(),
            RoleOption::Tact => self.tact(),
            RoleOption::Imu => self.imu(),
            RoleOption::OpticalEncOnEnc => self.optical_enc_on_enc(),
        }
    }
}
