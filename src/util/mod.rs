/// Round `value` up to the next multiple of `align`, a power of two.
pub(crate) fn align_to(value: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    Some(value.checked_add(align - 1)? & !(align - 1))
}

#[test]
fn aligns_rows() {
    assert_eq!(align_to(0, 256), Some(0));
    assert_eq!(align_to(1, 256), Some(256));
    assert_eq!(align_to(256, 256), Some(256));
    assert_eq!(align_to(257, 256), Some(512));
    assert_eq!(align_to(u32::MAX, 256), None);
}
