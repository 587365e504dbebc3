pub const KSEG_MASK: u64 = 0x1fff_ffff;
pub const XKPHYS_MASK: u64 = 0x0000_ffff_ffff_ffff;

pub fn align_up(val: u64, align: u64) -> u64 {
    if align == 0 { return val; }
    return val.div_ceil(align) * align;
}

pub fn align_down(val: u64, align: u64) -> u64 {
    if align == 0 { return val; }
    return val - val % align;
}

pub fn checked_align_up(val: usize, align: usize) -> Option<usize> {
    if align == 0 { return Some(val); }
    return val.checked_next_multiple_of(align);
}

/// Physical address behind a kernel link address.
pub fn virt_to_phys(addr: u64) -> u64 {
    return match addr {
        // KSEG0/KSEG1, as a 32-bit image spells them
        0x8000_0000..=0xbfff_ffff => addr & KSEG_MASK,
        // CKSEG0/CKSEG1, sign-extended
        0xffff_ffff_8000_0000..=0xffff_ffff_bfff_ffff => addr & KSEG_MASK,
        // XKPHYS, any cache attribute
        0x8000_0000_0000_0000..=0xbfff_ffff_ffff_ffff => addr & XKPHYS_MASK,
        _ => addr
    };
}
