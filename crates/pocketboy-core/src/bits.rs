/// Extract bits `lo..=hi` of `byte`, shifted down to bit 0.
pub fn get_bits(byte: u8, lo: u8, hi: u8) -> u8 {
    debug_assert!(lo <= hi && hi < 8, "bit range {lo}..={hi} out of bounds");
    let width = hi - lo + 1;
    let mask = if width >= 8 { 0xFF } else { (1u8 << width) - 1 };
    (byte >> lo) & mask
}

/// Interpret `byte` as a signed two's-complement value.
///
/// Used for relative jump offsets and for tile indices in the signed
/// addressing mode.
pub fn twos_complement(byte: u8) -> i8 {
    byte as i8
}

/// Zero-padded 16-bit hex, `0x0150` style.
pub fn hex16(value: u16) -> String {
    format!("{value:#06x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bit_ranges() {
        let byte = 0b0110_1010;
        assert_eq!(get_bits(byte, 6, 6), 0b1);
        assert_eq!(get_bits(byte, 5, 7), 0b011);
        assert_eq!(get_bits(byte, 2, 4), 0b010);
        assert_eq!(get_bits(byte, 0, 1), 0b10);
    }

    #[test]
    fn full_range_is_identity() {
        for byte in 0..=u8::MAX {
            assert_eq!(get_bits(byte, 0, 7), byte);
        }
    }

    #[test]
    fn twos_complement_decodes_signed_bytes() {
        assert_eq!(twos_complement(0b0000_0000), 0);
        assert_eq!(twos_complement(0b0000_0001), 1);
        assert_eq!(twos_complement(0b0111_1111), 127);
        assert_eq!(twos_complement(0b1000_0000), -128);
        assert_eq!(twos_complement(0b1000_0001), -127);
        assert_eq!(twos_complement(0b1111_1110), -2);
        assert_eq!(twos_complement(0b1111_1111), -1);
    }

    #[test]
    fn hex16_pads_to_four_digits() {
        assert_eq!(hex16(0x0150), "0x0150");
        assert_eq!(hex16(0), "0x0000");
        assert_eq!(hex16(0xFFFF), "0xffff");
    }
}
