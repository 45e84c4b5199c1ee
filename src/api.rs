//! The C interface, declared in `include/txkit.h`.
//!
//! Handles are boxed Rust values. Factories return null on failure, fallible operations return
//! `0` on success and an error code otherwise. Either way the outcome is recorded in the last
//! error slot. Passing dangling or foreign pointers is undefined behavior, null handles are
//! detected and reported as `NullHandle`.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use crate::context::Context;
use crate::error::{self, Error, Result, SUCCESS};
use crate::image::{ElementType, Image, ImageDim, MapMode};
use crate::io::ImageIo;
use crate::map::MappedView;
use crate::method::Method;
use crate::registry::Registry;

/// An instantiated method behind a thin pointer.
pub struct MethodHandle(Box<dyn Method>);

/// An open read view of an image.
pub struct MappedImageDataRead(MappedView);

/// An open write view of an image.
pub struct MappedImageDataWrite(MappedView);

/// Run the body of an entry point, recording its outcome in the last error slot.
fn entry<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
    let result = catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        log::error!("panic in the C interface: {}", message);
        Err(Error::backend(format!("panic: {}", message)))
    });

    error::record(result)
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(err) => err.kind().code(),
    }
}

fn into_handle<T>(result: Result<T>) -> *mut T {
    match result {
        Ok(value) => Box::into_raw(Box::new(value)),
        Err(_) => ptr::null_mut(),
    }
}

fn destroy<T>(handle: *mut T) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

fn get<'a, T>(handle: *const T, name: &'static str) -> Result<&'a T> {
    unsafe { handle.as_ref() }.ok_or(Error::NullHandle(name))
}

fn get_mut<'a, T>(handle: *mut T, name: &'static str) -> Result<&'a mut T> {
    unsafe { handle.as_mut() }.ok_or(Error::NullHandle(name))
}

fn element_type(raw: u32) -> Result<ElementType> {
    ElementType::from_raw(raw)
        .ok_or_else(|| Error::allocation(format!("unknown element type {}", raw)))
}

/// Create a CPU context.
#[no_mangle]
pub extern "C" fn txkit_context_new_cpu() -> *mut Context {
    into_handle(entry(|| Ok(Context::new_cpu())))
}

/// Create a GPU context, configured through `WGPU_BACKEND` and `WGPU_POWER_PREF`.
#[no_mangle]
pub extern "C" fn txkit_context_new_gpu() -> *mut Context {
    into_handle(entry(Context::new_gpu))
}

#[no_mangle]
pub extern "C" fn txkit_context_destroy(ctx: *mut Context) {
    destroy(ctx)
}

#[no_mangle]
pub extern "C" fn txkit_image_new_cpu(dim: ImageDim, element_type: u32) -> *mut Image {
    into_handle(entry(|| Image::new_cpu(dim, self::element_type(element_type)?)))
}

#[no_mangle]
pub extern "C" fn txkit_image_new_gpu_1d(
    dim: ImageDim,
    element_type: u32,
    ctx: *const Context,
) -> *mut Image {
    into_handle(entry(|| {
        Image::new_gpu_1d(dim, self::element_type(element_type)?, get(ctx, "ctx")?)
    }))
}

#[no_mangle]
pub extern "C" fn txkit_image_new_gpu_2d(
    dim: ImageDim,
    element_type: u32,
    ctx: *const Context,
) -> *mut Image {
    into_handle(entry(|| {
        Image::new_gpu_2d(dim, self::element_type(element_type)?, get(ctx, "ctx")?)
    }))
}

#[no_mangle]
pub extern "C" fn txkit_image_new_gpu_3d(
    dim: ImageDim,
    element_type: u32,
    ctx: *const Context,
) -> *mut Image {
    into_handle(entry(|| {
        Image::new_gpu_3d(dim, self::element_type(element_type)?, get(ctx, "ctx")?)
    }))
}

/// Destroy an image. An image with an open view is kept alive and a `MappingConflict` recorded.
#[no_mangle]
pub extern "C" fn txkit_image_destroy(image: *mut Image) {
    if let Some(mapped) = unsafe { image.as_ref() }.filter(|image| image.is_mapped()) {
        log::warn!("refusing to destroy {:?}", mapped);
        error::set_last_error(&Error::MappingConflict("destroy an image with an open view"));
        return;
    }

    destroy(image)
}

/// The dimensions of an image, all zero for a null image.
#[no_mangle]
pub extern "C" fn txkit_image_dim(image: *const Image) -> ImageDim {
    get(image, "image").map_or(ImageDim::new(0, 0, 0, 0), Image::dim)
}

/// The element type of an image, `u32::MAX` for a null image.
#[no_mangle]
pub extern "C" fn txkit_image_element_type(image: *const Image) -> u32 {
    get(image, "image").map_or(u32::MAX, |image| image.element_type() as u32)
}

#[no_mangle]
pub extern "C" fn txkit_image_upload(image: *mut Image) -> i32 {
    status(entry(|| get_mut(image, "image")?.upload().map(drop)))
}

#[no_mangle]
pub extern "C" fn txkit_image_download(image: *mut Image) -> i32 {
    status(entry(|| get_mut(image, "image")?.download().map(drop)))
}

#[no_mangle]
pub extern "C" fn txkit_image_map_read(image: *mut Image) -> *mut MappedImageDataRead {
    into_handle(entry(|| {
        let image = get_mut(image, "image")?;
        MappedView::open(image, MapMode::Read).map(MappedImageDataRead)
    }))
}

#[no_mangle]
pub extern "C" fn txkit_image_map_write(image: *mut Image) -> *mut MappedImageDataWrite {
    into_handle(entry(|| {
        let image = get_mut(image, "image")?;
        MappedView::open(image, MapMode::Write).map(MappedImageDataWrite)
    }))
}

/// The typed data of a view, null with a recorded `TypeMismatch` for the other element type.
fn view_data<T>(
    view: Result<&MappedView>,
    requested: ElementType,
    data: impl FnOnce(&MappedView) -> *mut T,
) -> *mut T {
    let data = entry(|| {
        let view = view?;
        let actual = view.element_type();
        if actual != requested {
            return Err(Error::TypeMismatch {
                requested: requested.name(),
                actual: actual.name(),
            });
        }

        Ok(data(view))
    });

    data.unwrap_or(ptr::null_mut())
}

/// The `float` data of a read view, null if the image does not hold `Float32`.
#[no_mangle]
pub extern "C" fn txkit_image_map_read_data_f32(map: *const MappedImageDataRead) -> *const f32 {
    let view = get(map, "map").map(|map| &map.0);
    view_data(view, ElementType::Float32, MappedView::data_f32).cast_const()
}

/// The `uint8_t` data of a read view, null if the image does not hold `UInt8`.
#[no_mangle]
pub extern "C" fn txkit_image_map_read_data_u8(map: *const MappedImageDataRead) -> *const u8 {
    let view = get(map, "map").map(|map| &map.0);
    view_data(view, ElementType::UInt8, MappedView::data_u8).cast_const()
}

/// The element count of a read view.
#[no_mangle]
pub extern "C" fn txkit_image_map_read_len(map: *const MappedImageDataRead) -> usize {
    get(map, "map").map_or(0, |map| map.0.len())
}

#[no_mangle]
pub extern "C" fn txkit_image_map_write_data_f32(map: *mut MappedImageDataWrite) -> *mut f32 {
    let view = get(map, "map").map(|map| &map.0);
    view_data(view, ElementType::Float32, MappedView::data_f32)
}

#[no_mangle]
pub extern "C" fn txkit_image_map_write_data_u8(map: *mut MappedImageDataWrite) -> *mut u8 {
    let view = get(map, "map").map(|map| &map.0);
    view_data(view, ElementType::UInt8, MappedView::data_u8)
}

#[no_mangle]
pub extern "C" fn txkit_image_map_write_len(map: *const MappedImageDataWrite) -> usize {
    get(map, "map").map_or(0, |map| map.0.len())
}

/// Close a read view and free it.
#[no_mangle]
pub extern "C" fn txkit_image_unmap_read(map: *mut MappedImageDataRead) -> i32 {
    status(entry(|| {
        get(map, "map")?;
        let map = unsafe { Box::from_raw(map) };
        map.0.close(MapMode::Read)
    }))
}

/// Close a write view and free it, the host copy of the image becomes the newer one.
#[no_mangle]
pub extern "C" fn txkit_image_unmap_write(map: *mut MappedImageDataWrite) -> i32 {
    status(entry(|| {
        get(map, "map")?;
        let map = unsafe { Box::from_raw(map) };
        map.0.close(MapMode::Write)
    }))
}

/// Create an empty binding table for images of `ctx`.
#[no_mangle]
pub extern "C" fn txkit_image_io_new(ctx: *const Context) -> *mut ImageIo {
    into_handle(entry(|| get(ctx, "ctx").map(ImageIo::new)))
}

#[no_mangle]
pub extern "C" fn txkit_image_io_destroy(io: *mut ImageIo) {
    destroy(io)
}

/// Bind `image` to an image unit, null clears the slot.
#[no_mangle]
pub extern "C" fn txkit_image_io_set_image_binding(
    io: *mut ImageIo,
    index: usize,
    image: *const Image,
) -> i32 {
    status(entry(|| {
        let image = unsafe { image.as_ref() };
        get_mut(io, "io")?.set_image_binding(index, image)
    }))
}

/// Bind `image` to a texture unit, null clears the slot.
#[no_mangle]
pub extern "C" fn txkit_image_io_set_texture_binding(
    io: *mut ImageIo,
    index: usize,
    image: *const Image,
) -> i32 {
    status(entry(|| {
        let image = unsafe { image.as_ref() };
        get_mut(io, "io")?.set_texture_binding(index, image)
    }))
}

#[no_mangle]
pub extern "C" fn txkit_registry_new_builtin() -> *mut Registry {
    into_handle(entry(|| Ok(Registry::builtin())))
}

#[no_mangle]
pub extern "C" fn txkit_registry_destroy(registry: *mut Registry) {
    destroy(registry)
}

/// Create a method by its exact name, null if the registry has no such method.
#[no_mangle]
pub extern "C" fn txkit_method_new(
    registry: *const Registry,
    method_name: *const c_char,
) -> *mut MethodHandle {
    into_handle(entry(|| {
        let registry = get(registry, "registry")?;
        if method_name.is_null() {
            return Err(Error::NullHandle("method_name"));
        }

        let name = unsafe { CStr::from_ptr(method_name) };
        let name = name
            .to_str()
            .map_err(|_| Error::UnknownMethod(name.to_string_lossy().into_owned()))?;
        registry.method_new(name).map(MethodHandle)
    }))
}

#[no_mangle]
pub extern "C" fn txkit_method_destroy(method: *mut MethodHandle) {
    destroy(method)
}

/// The byte size of the parameter structure of a method, `0` for a null method.
#[no_mangle]
pub extern "C" fn txkit_method_params_size(method: *const MethodHandle) -> usize {
    get(method, "method").map_or(0, |method| method.0.params_size())
}

/// Compute into `tgt`.
///
/// `params` points to `params_size` bytes of the method's parameter structure, or is null to
/// use the defaults.
#[no_mangle]
pub extern "C" fn txkit_method_compute(
    ctx: *mut Context,
    method: *mut MethodHandle,
    tgt: *mut Image,
    params: *const c_void,
    params_size: usize,
) -> i32 {
    status(entry(|| {
        let ctx = get_mut(ctx, "ctx")?;
        let method = get_mut(method, "method")?;
        let tgt = get_mut(tgt, "tgt")?;

        let params = if params.is_null() {
            None
        } else {
            Some(unsafe { core::slice::from_raw_parts(params.cast::<u8>(), params_size) })
        };

        method.0.compute(ctx, tgt, params)
    }))
}

/// The message of the last error, null if the most recent fallible call succeeded.
///
/// The string is owned by the library and valid until the next fallible call.
#[no_mangle]
pub extern "C" fn txkit_get_last_error() -> *const c_char {
    error::last_error_ptr()
}

/// The code of the last error, `0` if the most recent fallible call succeeded.
#[no_mangle]
pub extern "C" fn txkit_get_last_error_code() -> i32 {
    error::last_error_kind().map_or(SUCCESS, |kind| kind.code())
}
