use txkit::{Coherency, Context, ElementType, ErrorKind, Image, ImageDim, ImageIo, SyncOutcome};

#[path = "util.rs"]
mod util;

#[test]
fn dimensions_round_trip() {
    util::init_logging();

    let dims = [
        (1, 1, 1, 1),
        (256, 1, 1, 1),
        (17, 9, 1, 3),
        (32, 32, 4, 4),
        (5, 7, 11, 2),
    ];

    for (width, height, depth, channels) in dims {
        let dim = ImageDim::new(width, height, depth, channels);
        for element_type in [ElementType::UInt8, ElementType::Float32] {
            let mut image = Image::new_cpu(dim, element_type).expect("Host image allocated");
            assert_eq!(image.dim(), dim);
            assert_eq!(image.element_type(), element_type);
            assert_eq!(image.coherency(), Coherency::HostOnly);
            assert_eq!(image.map_read().unwrap().len(), width * height * depth * channels);
        }
    }
}

#[test]
fn zero_extents_are_rejected() {
    for dim in [
        ImageDim::new(0, 4, 1, 1),
        ImageDim::new(4, 0, 1, 1),
        ImageDim::new(4, 4, 0, 1),
        ImageDim::new(4, 4, 1, 0),
    ] {
        let err = Image::new_cpu(dim, ElementType::Float32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    }

    let huge = ImageDim::new(usize::MAX / 2, 4, 1, 1);
    let err = Image::new_cpu(huge, ElementType::UInt8).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
}

#[test]
fn written_data_reads_back() {
    let dim = ImageDim::new(8, 4, 2, 3);
    let mut image = Image::new_cpu(dim, ElementType::Float32).unwrap();

    {
        let mut view = image.map_write().unwrap();
        assert!(view.as_u8_mut().is_none());
        let data = view.as_f32_mut().unwrap();
        for (i, value) in data.iter_mut().enumerate() {
            *value = i as f32 * 0.5;
        }
    }

    let view = image.map_read().unwrap();
    let data = view.as_f32().unwrap();
    assert_eq!(data[dim.index(3, 2, 1, 2)], dim.index(3, 2, 1, 2) as f32 * 0.5);
    assert!(data.iter().enumerate().all(|(i, v)| *v == i as f32 * 0.5));
}

#[test]
fn bytes_read_back_unchanged() {
    let mut image = Image::new_cpu(ImageDim::new(16, 16, 1, 4), ElementType::UInt8).unwrap();
    image
        .map_write()
        .unwrap()
        .as_u8_mut()
        .unwrap()
        .iter_mut()
        .enumerate()
        .for_each(|(i, v)| *v = i as u8);

    let view = image.map_read().unwrap();
    assert!(view.as_f32().is_none());
    assert!(view.as_u8().unwrap().iter().enumerate().all(|(i, v)| *v == i as u8));
}

#[test]
fn host_images_have_no_transfers() {
    let mut image = Image::new_cpu(ImageDim::new(4, 4, 1, 1), ElementType::Float32).unwrap();
    image.map_write().unwrap().as_f32_mut().unwrap().fill(0.75);

    for _ in 0..2 {
        assert_eq!(image.upload().unwrap(), SyncOutcome::NoDeviceBacking);
        assert_eq!(image.download().unwrap(), SyncOutcome::NoDeviceBacking);
    }

    assert_eq!(image.coherency(), Coherency::HostOnly);
    assert!(image.map_read().unwrap().as_f32().unwrap().iter().all(|v| *v == 0.75));
}

#[test]
fn device_images_need_a_gpu_context() {
    let ctx = Context::new_cpu();
    let dim = ImageDim::new(4, 4, 1, 1);

    let err = Image::new_gpu_2d(dim, ElementType::Float32, &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextMismatch);

    let err = Image::new_gpu_1d(dim, ElementType::Float32, &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedTarget);
}

#[test]
fn binding_slots_are_bounded() {
    let ctx = Context::new_cpu();
    let image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::UInt8).unwrap();
    let mut io = ImageIo::new(&ctx);
    assert_eq!(io.slots(), ctx.binding_slots());

    let last = io.slots() - 1;
    io.set_image_binding(last, Some(&image)).unwrap();
    io.set_texture_binding(0, Some(&image)).unwrap();
    assert!(io.is_image_bound(last));
    assert!(io.is_texture_bound(0));
    assert!(!io.is_texture_bound(last));

    let err = io.set_texture_binding(io.slots(), Some(&image)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BindingOutOfRange);
    let err = io.set_image_binding(io.slots(), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BindingOutOfRange);

    io.set_image_binding(last, None).unwrap();
    assert!(!io.is_image_bound(last));
}
