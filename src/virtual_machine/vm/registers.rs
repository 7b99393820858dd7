use crate::virtual_machine::register::{FLOAT_REGISTERS, INTEGER_REGISTERS, Register};

/// Register file.
///
/// Every register is a 64-bit cell; float registers hold the IEEE-754 bit
/// pattern. The banks are separate fields so a syscall view can borrow them
/// independently.
#[derive(Debug, Clone, Default)]
pub struct Registers {
    pub(super) x0: u64,
    pub(super) x1: u64,
    pub(super) ip: u64,
    pub(super) sp: u64,
    pub(super) fp: u64,
    pub(super) ints: [u64; INTEGER_REGISTERS],
    pub(super) floats: [u64; FLOAT_REGISTERS],
    pub(super) op: u64,
}

impl Registers {
    pub fn new() -> Self {
        let mut regs = Self::default();
        regs.reset_constants();
        regs
    }

    /// Restores `x0 = 0` and `x1 = 1`.
    pub fn reset_constants(&mut self) {
        self.x0 = 0;
        self.x1 = 1;
    }

    pub fn get(&self, reg: Register) -> u64 {
        match reg {
            Register::X0 => self.x0,
            Register::X1 => self.x1,
            Register::Ip => self.ip,
            Register::Sp => self.sp,
            Register::Fp => self.fp,
            Register::Op => self.op,
            other => match (other.integer_index(), other.float_index()) {
                (Some(i), _) => self.ints[i],
                (_, Some(i)) => self.floats[i],
                _ => 0,
            },
        }
    }

    pub fn set(&mut self, reg: Register, value: u64) {
        let cell = match reg {
            Register::X0 => &mut self.x0,
            Register::X1 => &mut self.x1,
            Register::Ip => &mut self.ip,
            Register::Sp => &mut self.sp,
            Register::Fp => &mut self.fp,
            Register::Op => &mut self.op,
            other => match (other.integer_index(), other.float_index()) {
                (Some(i), _) => &mut self.ints[i],
                (_, Some(i)) => &mut self.floats[i],
                _ => return,
            },
        };
        *cell = value;
    }

    /// Signed view of a register.
    pub fn get_int(&self, reg: Register) -> i64 {
        self.get(reg) as i64
    }

    pub fn set_int(&mut self, reg: Register, value: i64) {
        self.set(reg, value as u64);
    }

    /// Float view of a register.
    pub fn get_float(&self, reg: Register) -> f64 {
        f64::from_bits(self.get(reg))
    }

    pub fn set_float(&mut self, reg: Register, value: f64) {
        self.set(reg, value.to_bits());
    }
}
