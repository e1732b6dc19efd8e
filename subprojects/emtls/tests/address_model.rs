//! Per-thread address semantics: stability, alignment, initialization.

#![cfg(feature = "threads")]

use emtls::{EmutlsObject, get_address};

#[test]
fn address_is_stable_across_accesses() {
    let obj = EmutlsObject::new(8, 8);
    let first = get_address(&obj);
    let second = get_address(&obj);
    assert_eq!(first, second);
}

#[test]
fn each_thread_gets_its_own_instance() {
    static OBJ: EmutlsObject = EmutlsObject::new(8, 8);

    let mine = get_address(&OBJ);
    // The main thread's block stays alive while the child runs, so the
    // child's instance cannot share its address.
    let theirs = std::thread::spawn(|| get_address(&OBJ).as_ptr() as usize)
        .join()
        .unwrap();
    assert_ne!(mine.as_ptr() as usize, theirs);
}

#[test]
fn store_growth_never_moves_existing_blocks() {
    let anchor = EmutlsObject::new(16, 8);
    let before = get_address(&anchor);

    // Burn through enough fresh slots to force the store's entry array to
    // grow several times.
    let filler: Vec<EmutlsObject> = (0..150).map(|_| EmutlsObject::new(8, 8)).collect();
    for obj in &filler {
        get_address(obj);
    }

    assert_eq!(get_address(&anchor), before);
}

#[test]
fn honors_every_alignment() {
    for align in [1usize, 2, 4, 8, 16, 32, 64] {
        let obj = EmutlsObject::new(24, align);
        let addr = get_address(&obj).as_ptr() as usize;
        assert_eq!(addr % align, 0, "misaligned instance for align {align}");
    }
}

#[test]
fn zero_fills_without_template() {
    let obj = EmutlsObject::new(32, 8);
    let addr = get_address(&obj);
    let bytes = unsafe { std::slice::from_raw_parts(addr.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn initializes_from_template_and_keeps_writes() {
    static TEMPL: [u8; 8] = [0xAA; 8];
    let obj = unsafe { EmutlsObject::with_template(8, 8, TEMPL.as_ptr().cast_mut()) };

    let addr = get_address(&obj).as_ptr();
    let bytes = unsafe { std::slice::from_raw_parts(addr, 8) };
    assert_eq!(bytes, &TEMPL);

    unsafe { addr.write(0x55) };
    // Same instance on re-access: the write sticks.
    let again = get_address(&obj).as_ptr();
    assert_eq!(again, addr);
    assert_eq!(unsafe { again.read() }, 0x55);
}

#[test]
fn late_enlargement_never_resizes_existing_blocks() {
    static T_SMALL: [u8; 4] = [1; 4];
    static T_LARGE: [u8; 8] = [2; 8];

    let obj = EmutlsObject::new(0, 1);
    unsafe { obj.register(4, 4, T_SMALL.as_ptr()) };

    let before = get_address(&obj);
    let bytes = unsafe { std::slice::from_raw_parts(before.as_ptr(), 4) };
    assert_eq!(bytes, &T_SMALL);

    // An enlarging registration after first access is ill-formed usage; the
    // merged layout applies to threads that have not created their block
    // yet, while this thread keeps its original, smaller block as-is.
    unsafe { obj.register(8, 8, T_LARGE.as_ptr()) };
    assert_eq!(get_address(&obj), before);

    let fresh = std::thread::spawn(move || {
        let addr = get_address(&obj);
        let bytes = unsafe { std::slice::from_raw_parts(addr.as_ptr(), 8) };
        assert_eq!(bytes, &T_LARGE);
        assert_eq!(addr.as_ptr() as usize % 8, 0);
    });
    fresh.join().unwrap();
}
