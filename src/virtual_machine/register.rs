//! Register identifiers.
//!
//! Every register has a fixed one-byte id used in the bytecode and a fixed
//! assembly name. The id-to-storage mapping lives in
//! [`Registers`](super::vm::registers::Registers); decoded instructions only
//! carry a [`Register`].

use crate::virtual_machine::errors::VMError;
use std::fmt;

/// Number of general purpose integer registers (`i0`..`i9`).
pub const INTEGER_REGISTERS: usize = 10;
/// Number of general purpose float registers (`f0`..`f9`).
pub const FLOAT_REGISTERS: usize = 10;

macro_rules! define_registers {
    ( $( $name:ident = $id:expr, $text:literal ),* $(,)? ) => {
        /// One addressable register of the machine.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Register {
            $( $name = $id, )*
        }

        impl Register {
            /// Every register, in id order.
            pub const ALL: &'static [Register] = &[ $( Register::$name, )* ];

            /// Returns the assembly name (`i0`, `sp`, ...).
            pub const fn name(&self) -> &'static str {
                match self {
                    $( Register::$name => $text, )*
                }
            }

            /// Looks a register up by its assembly name.
            pub fn from_name(name: &str) -> Option<Register> {
                match name {
                    $( $text => Some(Register::$name), )*
                    _ => None,
                }
            }
        }

        impl TryFrom<u8> for Register {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $id => Ok(Register::$name), )*
                    _ => Err(VMError::UnknownRegister(value)),
                }
            }
        }
    };
}

define_registers! {
    X0 = 0x00, "x0",
    X1 = 0x01, "x1",
    Ip = 0x02, "ip",
    Sp = 0x03, "sp",
    Fp = 0x04, "fp",
    I0 = 0x10, "i0",
    I1 = 0x11, "i1",
    I2 = 0x12, "i2",
    I3 = 0x13, "i3",
    I4 = 0x14, "i4",
    I5 = 0x15, "i5",
    I6 = 0x16, "i6",
    I7 = 0x17, "i7",
    I8 = 0x18, "i8",
    I9 = 0x19, "i9",
    F0 = 0x20, "f0",
    F1 = 0x21, "f1",
    F2 = 0x22, "f2",
    F3 = 0x23, "f3",
    F4 = 0x24, "f4",
    F5 = 0x25, "f5",
    F6 = 0x26, "f6",
    F7 = 0x27, "f7",
    F8 = 0x28, "f8",
    F9 = 0x29, "f9",
    Op = 0xFF, "op",
}

impl Register {
    /// Returns the bytecode id.
    pub const fn id(&self) -> u8 {
        *self as u8
    }

    /// Index into the integer bank for `i0`..`i9`.
    pub const fn integer_index(&self) -> Option<usize> {
        let id = self.id();
        if id >= 0x10 && id < 0x10 + INTEGER_REGISTERS as u8 {
            Some((id - 0x10) as usize)
        } else {
            None
        }
    }

    /// Index into the float bank for `f0`..`f9`.
    pub const fn float_index(&self) -> Option<usize> {
        let id = self.id();
        if id >= 0x20 && id < 0x20 + FLOAT_REGISTERS as u8 {
            Some((id - 0x20) as usize)
        } else {
            None
        }
    }

    /// True for `x0` and `x1`, which are restored before every instruction.
    pub const fn is_constant(&self) -> bool {
        matches!(self, Register::X0 | Register::X1)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
