//! Bit addresses of the special-function registers that the bit router
//! understands, and the bit layout of the program status word.

/// Port 0 bit base: P0.0 through P0.7 live at `0x80..=0x87`.
pub const BIT_P0: u16 = 0x80;
/// Port 1 bit base: P1.0 through P1.7 live at `0x90..=0x97`.
pub const BIT_P1: u16 = 0x90;
/// Port 2 bit base: P2.0 through P2.7 live at `0xA0..=0xA7`.
pub const BIT_P2: u16 = 0xA0;
/// Flag bit window: bits 2, 4 and 5 select OV, AC and P.
pub const BIT_FLAGS: u16 = 0xB0;
/// Port 3 bit base. Moved off `0xB0` so it doesn't collide with the flag
/// window; P3.0 through P3.7 live at `0xB8..=0xBF`.
pub const BIT_P3: u16 = 0xB8;
/// Program status word: `SETB` on this exact address sets the carry flag.
pub const BIT_PSW: u16 = 0xD0;
/// Accumulator: `SETB` on this exact address sets bit 0 of A.
pub const BIT_A: u16 = 0xE0;
/// B register: `SETB` on this exact address sets bit 0 of B.
pub const BIT_B: u16 = 0xF0;

/// Highest bit address that maps into data space.
pub const BIT_DATA_END: u16 = 0x7F;
/// Code-space bit window. Code space is immutable at the bit level.
pub const BIT_CODE_START: u16 = 0x2000;
pub const BIT_CODE_END: u16 = 0x2FFF;

/// Carry flag: indicates carry from/to the most significant bit
pub const PSW_C: u8 = 0x07;
/// Auxiliary carry flag: indicates carry from/to the fourth bit
pub const PSW_AC: u8 = 0x06;
/// User-defined flag 0
pub const PSW_F0: u8 = 0x05;
/// Register bank select 1. Stored but bank switching is not modelled.
pub const PSW_RS1: u8 = 0x04;
/// Register bank select 0. Stored but bank switching is not modelled.
pub const PSW_RS0: u8 = 0x03;
/// Overflow flag: indicates signed overflow out of bit 7
pub const PSW_OV: u8 = 0x02;
/// Reserved bit: always reads as zero
pub const PSW_RES: u8 = 0x01;
/// Parity flag: set when the value has an even number of 1s
pub const PSW_P: u8 = 0x00;
