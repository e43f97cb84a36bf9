use std::fmt::Debug;
use std::mem::size_of;
use std::ops::RangeInclusive;

/// Contains some helper methods to manipulate bits,
/// the index (`bit_idx`) is supposed to be from lsb to msb (right to left)
pub trait Bits
where
    Self: Copy + Sized + Into<u128> + TryFrom<u128> + From<bool>,
    <Self as TryFrom<u128>>::Error: Debug,
{
    fn is_bit_on(&self, bit_idx: u8) -> bool {
        debug_assert!(bit_idx < (size_of::<Self>() * 8) as u8);
        let bitwise: u128 = (*self).into();
        let mask: u128 = 0b1 << bit_idx;
        (bitwise & mask) != 0
    }

    fn set_bit_on(&mut self, bit_idx: u8) {
        debug_assert!(bit_idx < (size_of::<Self>() * 8) as u8);
        let mut bitwise: u128 = (*self).into();
        bitwise |= 0b1 << bit_idx;
        *self = <Self as TryFrom<u128>>::try_from(bitwise).unwrap();
    }

    fn set_bit_off(&mut self, bit_idx: u8) {
        debug_assert!(bit_idx < (size_of::<Self>() * 8) as u8);
        let mut bitwise: u128 = (*self).into();
        bitwise &= !(0b1 << bit_idx);
        *self = <Self as TryFrom<u128>>::try_from(bitwise).unwrap();
    }

    fn set_bit(&mut self, bit_idx: u8, value: bool) {
        if value {
            self.set_bit_on(bit_idx);
        } else {
            self.set_bit_off(bit_idx);
        }
    }

    fn get_bit(&self, bit_idx: u8) -> bool {
        self.is_bit_on(bit_idx)
    }

    fn get_bits(&self, bits_range: RangeInclusive<u8>) -> Self {
        let start = *bits_range.start();
        let length = bits_range.len();
        debug_assert!(start as usize + length <= size_of::<Self>() * 8);

        // `length` ones, moved to the start of the range.
        let mask = ((1_u128 << length) - 1) << start;
        let value: u128 = (*self).into();

        // We apply the mask and then move the value back to the 0 position.
        <Self as TryFrom<u128>>::try_from((value & mask) >> start).unwrap()
    }

    /// Replaces the bits in `bits_range` with the lowest bits of `value`.
    fn set_bits(&mut self, bits_range: RangeInclusive<u8>, value: Self) {
        let start = *bits_range.start();
        let length = bits_range.len();
        debug_assert!(start as usize + length <= size_of::<Self>() * 8);

        let mask = ((1_u128 << length) - 1) << start;
        let current: u128 = (*self).into();
        let value: u128 = value.into();
        let updated = (current & !mask) | ((value << start) & mask);
        *self = <Self as TryFrom<u128>>::try_from(updated).unwrap();
    }

    fn get_byte(&self, byte_nth: u8) -> u8 {
        debug_assert!(byte_nth < size_of::<Self>() as u8);

        // We access the byte_nth octet:
        // from the byte_nth*8 bit to the byte_nth*8+7 bit (inclusive)
        let value: u128 = (*self).into();
        ((value >> (byte_nth * 8)) & 0xFF) as u8
    }

    /// Returns a sign-extended copy of the value.
    /// `number_of_bits` is the width of the two's complement value
    /// we want to sign-extend to the full width of `Self`.
    fn sign_extended(&self, number_of_bits: u8) -> Self {
        let value: u128 = (*self).into();

        // `mask` has a 1 in the sign bit position of the narrow value.
        // `value ^ mask` clears the sign bit when it is set, so subtracting the
        // mask borrows through every upper bit. When the sign bit is clear the
        // XOR sets it and the subtraction removes it again, leaving the value as is.
        // Example in 4 bits: 0b1001 ^ 0b1000 = 0b0001, 0b0001 - 0b1000 = ...1111_1001 (-7).
        let mask = 1_i128 << (number_of_bits - 1);
        let value = ((value as i128 ^ mask) - mask) as u128;

        // Leading ones past the width of `Self` would make the `try_from` fail.
        let size_bits = (size_of::<Self>() * 8) as u32;
        let value = if size_bits >= 128 {
            value
        } else {
            value & ((1 << size_bits) - 1)
        };

        <Self as TryFrom<u128>>::try_from(value).unwrap()
    }
}

impl Bits for u64 {}
impl Bits for u32 {}
impl Bits for u16 {}
impl Bits for u8 {}
