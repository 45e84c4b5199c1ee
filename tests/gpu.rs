//! Device tests, skipped on machines without a usable adapter.
use txkit::{
    Coherency, Context, ElementType, ErrorKind, Image, ImageDim, ImageIo, Method, PhasorNoiseParams,
    Registry, SyncOutcome, WhiteNoiseParams,
};

#[path = "util.rs"]
mod util;

#[test]
fn creates_images_of_every_rank() {
    let Some(ctx) = util::gpu_context() else {
        return;
    };

    let image = Image::new_gpu_1d(ImageDim::new(64, 1, 1, 1), ElementType::UInt8, &ctx).unwrap();
    assert_eq!(image.context(), Some(ctx.id()));
    assert_eq!(image.coherency(), Coherency::DeviceOnly);

    let image = Image::new_gpu_2d(ImageDim::new(33, 17, 1, 3), ElementType::Float32, &ctx).unwrap();
    assert_eq!(image.dim(), ImageDim::new(33, 17, 1, 3));

    let image = Image::new_gpu_3d(ImageDim::new(8, 8, 4, 4), ElementType::UInt8, &ctx).unwrap();
    assert_eq!(image.dim().depth, 4);

    let err = Image::new_gpu_2d(ImageDim::new(8, 8, 2, 1), ElementType::UInt8, &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedTarget);
    let err = Image::new_gpu_3d(ImageDim::new(8, 8, 1, 5), ElementType::UInt8, &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedTarget);
}

#[test]
fn white_noise_matches_the_host() {
    let Some(mut gpu) = util::gpu_context() else {
        return;
    };
    let mut cpu = Context::new_cpu();
    let registry = Registry::builtin();
    let mut method = registry.method_new("white_noise").unwrap();
    let params = WhiteNoiseParams { global_seed: 42 };
    let dim = ImageDim::new(64, 48, 1, 1);

    let mut device = Image::new_gpu_2d(dim, ElementType::Float32, &gpu).unwrap();
    method
        .compute_params(&mut gpu, &mut device, Some(&params))
        .unwrap();
    assert_eq!(device.coherency(), Coherency::DeviceOnly);

    let mut host = Image::new_cpu(dim, ElementType::Float32).unwrap();
    method
        .compute(&mut cpu, &mut host, Some(bytemuck::bytes_of(&params)))
        .unwrap();

    let device_view = device.map_read().unwrap();
    let host_view = host.map_read().unwrap();
    let (device_data, host_data) = (device_view.as_f32().unwrap(), host_view.as_f32().unwrap());
    assert!(device_data.iter().all(|v| (0.0..1.0).contains(v)));
    for (d, h) in device_data.iter().zip(host_data) {
        assert!((d - h).abs() < 1e-6, "{} vs. {}", d, h);
    }
}

#[test]
fn builtins_render_on_the_device() {
    let Some(mut ctx) = util::gpu_context() else {
        return;
    };
    let registry = Registry::builtin();

    for name in registry.names() {
        let mut method = registry.method_new(name).unwrap();
        for element_type in [ElementType::UInt8, ElementType::Float32] {
            let mut image = Image::new_gpu_2d(ImageDim::new(40, 24, 1, 4), element_type, &ctx).unwrap();
            method
                .compute(&mut ctx, &mut image, None)
                .unwrap_or_else(|err| panic!("{} failed: {}", name, err));

            let view = image.map_read().unwrap();
            if let Some(data) = view.as_f32() {
                assert!(data.iter().all(|v| (0.0..=1.0).contains(v)), "{}", name);
            }
        }
    }
}

#[test]
fn coherency_follows_transfers() {
    let Some(mut ctx) = util::gpu_context() else {
        return;
    };
    let registry = Registry::builtin();
    let mut method = registry.method_new("debug").unwrap();
    let dim = ImageDim::new(16, 16, 1, 1);
    let mut image = Image::new_gpu_2d(dim, ElementType::Float32, &ctx).unwrap();

    // Nothing to upload before any host access.
    assert_eq!(image.upload().unwrap(), SyncOutcome::UpToDate);
    assert_eq!(image.download().unwrap(), SyncOutcome::Transferred);
    assert_eq!(image.coherency(), Coherency::Synced);
    assert_eq!(image.download().unwrap(), SyncOutcome::UpToDate);

    image.map_write().unwrap().as_f32_mut().unwrap().fill(0.5);
    assert_eq!(image.coherency(), Coherency::HostNewer);
    assert_eq!(image.upload().unwrap(), SyncOutcome::Transferred);
    assert_eq!(image.upload().unwrap(), SyncOutcome::UpToDate);
    assert_eq!(image.coherency(), Coherency::Synced);

    method.compute(&mut ctx, &mut image, None).unwrap();
    assert_eq!(image.coherency(), Coherency::DeviceNewer);

    let view = image.map_read().unwrap();
    let data = view.as_f32().unwrap();
    // Channel 0 of the debug pattern is the relative x coordinate.
    assert!((data[dim.index(15, 3, 0, 0)] - 31.0 / 32.0).abs() < 1e-5);
    drop(view);
    assert_eq!(image.coherency(), Coherency::Synced);
}

#[test]
fn uploaded_data_reads_back() {
    let Some(ctx) = util::gpu_context() else {
        return;
    };
    let dim = ImageDim::new(13, 7, 1, 3);
    let mut image = Image::new_gpu_2d(dim, ElementType::UInt8, &ctx).unwrap();

    image
        .map_write()
        .unwrap()
        .as_u8_mut()
        .unwrap()
        .iter_mut()
        .enumerate()
        .for_each(|(i, v)| *v = (i % 251) as u8);
    assert_eq!(image.upload().unwrap(), SyncOutcome::Transferred);

    // A fresh image of the same context sees nothing of it, this one round trips it.
    let mut other = Image::new_gpu_2d(dim, ElementType::UInt8, &ctx).unwrap();
    assert!(other.map_read().unwrap().as_u8().unwrap().iter().all(|v| *v == 0));

    let crc = util::image_crc(&mut image);
    let mut copy = Image::new_cpu(dim, ElementType::UInt8).unwrap();
    copy.map_write()
        .unwrap()
        .as_u8_mut()
        .unwrap()
        .iter_mut()
        .enumerate()
        .for_each(|(i, v)| *v = (i % 251) as u8);
    assert_eq!(crc, util::image_crc(&mut copy));
}

#[test]
fn contexts_do_not_mix() {
    let Some(mut first) = util::gpu_context() else {
        return;
    };
    let Some(second) = util::gpu_context() else {
        return;
    };
    let registry = Registry::builtin();
    let mut method = registry.method_new("phasor_noise").unwrap();
    let dim = ImageDim::new(16, 16, 1, 1);

    let mut foreign = Image::new_gpu_2d(dim, ElementType::Float32, &second).unwrap();
    let err = method.compute(&mut first, &mut foreign, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextMismatch);

    let mut host = Image::new_cpu(dim, ElementType::Float32).unwrap();
    let err = method.compute(&mut first, &mut host, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextMismatch);

    let mut io = ImageIo::new(&first);
    let err = io.set_texture_binding(0, Some(&foreign)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleContext);
    let err = io.set_texture_binding(0, Some(&host)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleContext);

    let field = Image::new_gpu_2d(dim, ElementType::Float32, &first).unwrap();
    io.set_texture_binding(0, Some(&field)).unwrap();

    let mut target = Image::new_gpu_2d(dim, ElementType::Float32, &first).unwrap();
    let params = PhasorNoiseParams {
        io: &io,
        ..PhasorNoiseParams::default()
    };
    method
        .compute_params(&mut first, &mut target, Some(&params))
        .unwrap();
}

#[test]
fn orientation_fields_must_be_uploaded() {
    let Some(mut ctx) = util::gpu_context() else {
        return;
    };
    let registry = Registry::builtin();
    let mut method = registry.method_new("phasor_noise").unwrap();
    let dim = ImageDim::new(16, 16, 1, 1);

    let mut field = Image::new_gpu_2d(dim, ElementType::Float32, &ctx).unwrap();
    field.map_write().unwrap().as_f32_mut().unwrap().fill(0.25);
    assert_eq!(field.coherency(), Coherency::HostNewer);

    let mut io = ImageIo::new(&ctx);
    io.set_texture_binding(0, Some(&field)).unwrap();
    let params = PhasorNoiseParams {
        io: &io,
        ..PhasorNoiseParams::default()
    };

    let mut target = Image::new_gpu_2d(dim, ElementType::Float32, &ctx).unwrap();
    let err = method
        .compute_params(&mut ctx, &mut target, Some(&params))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MappingConflict);
    assert_eq!(field.coherency(), Coherency::HostNewer);

    assert_eq!(field.upload().unwrap(), SyncOutcome::Transferred);
    method
        .compute_params(&mut ctx, &mut target, Some(&params))
        .unwrap();
}
