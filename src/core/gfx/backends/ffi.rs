//! Fixed-function OpenGL entry points that glow does not expose (client
//! arrays, matrix stack, fog, alpha test and display lists).

use crate::core::gfx::error::{GfxError, GfxResult};
use std::ffi::{CStr, c_void};

pub const FOG: u32 = 0x0B60;
pub const FOG_DENSITY: u32 = 0x0B62;
pub const FOG_END: u32 = 0x0B64;
pub const FOG_MODE: u32 = 0x0B65;
pub const FOG_COLOR: u32 = 0x0B66;
pub const FOG_HINT: u32 = 0x0C54;
pub const EXP: u32 = 0x0800;
pub const EXP2: u32 = 0x0801;
pub const ALPHA_TEST: u32 = 0x0BC0;

pub const MODELVIEW: u32 = 0x1700;
pub const PROJECTION: u32 = 0x1701;
pub const TEXTURE: u32 = 0x1702;

pub const VERTEX_ARRAY: u32 = 0x8074;
pub const COLOR_ARRAY: u32 = 0x8076;
pub const TEXTURE_COORD_ARRAY: u32 = 0x8078;

pub const COMPILE: u32 = 0x1300;

type ClientStateFn = unsafe extern "system" fn(u32);
type PointerFn = unsafe extern "system" fn(i32, u32, i32, *const c_void);
type MatrixModeFn = unsafe extern "system" fn(u32);
type LoadMatrixFn = unsafe extern "system" fn(*const f32);
type LoadIdentityFn = unsafe extern "system" fn();
type FogfFn = unsafe extern "system" fn(u32, f32);
type FogfvFn = unsafe extern "system" fn(u32, *const f32);
type FogiFn = unsafe extern "system" fn(u32, i32);
type AlphaFuncFn = unsafe extern "system" fn(u32, f32);
type GenListsFn = unsafe extern "system" fn(i32) -> u32;
type NewListFn = unsafe extern "system" fn(u32, u32);
type EndListFn = unsafe extern "system" fn();
type CallListFn = unsafe extern "system" fn(u32);
type DeleteListsFn = unsafe extern "system" fn(u32, i32);
type DrawElementsFn = unsafe extern "system" fn(u32, i32, u32, *const c_void);

pub struct FixedFunctionGl {
    enable_client_state: ClientStateFn,
    disable_client_state: ClientStateFn,
    vertex_pointer: PointerFn,
    color_pointer: PointerFn,
    tex_coord_pointer: PointerFn,
    matrix_mode: MatrixModeFn,
    load_matrix: LoadMatrixFn,
    load_identity: LoadIdentityFn,
    fogf: FogfFn,
    fogfv: FogfvFn,
    fogi: FogiFn,
    alpha_func: AlphaFuncFn,
    gen_lists: GenListsFn,
    new_list: NewListFn,
    end_list: EndListFn,
    call_list: CallListFn,
    delete_lists: DeleteListsFn,
    draw_elements: DrawElementsFn,
}

impl FixedFunctionGl {
    /// Resolves every entry point through `loader` (the context's
    /// `get_proc_address`). Fails if the driver lacks any of them.
    pub fn load(mut loader: impl FnMut(&CStr) -> *const c_void) -> GfxResult<Self> {
        macro_rules! load {
            ($name:literal) => {{
                let ptr = loader($name);
                if ptr.is_null() {
                    return Err(GfxError::Unsupported(format!(
                        "driver does not export {}",
                        $name.to_string_lossy()
                    )));
                }
                // SAFETY: a non-null address for exactly this symbol, whose C
                // signature matches the field it is stored in.
                unsafe { std::mem::transmute::<*const c_void, _>(ptr) }
            }};
        }

        Ok(Self {
            enable_client_state: load!(c"glEnableClientState"),
            disable_client_state: load!(c"glDisableClientState"),
            vertex_pointer: load!(c"glVertexPointer"),
            color_pointer: load!(c"glColorPointer"),
            tex_coord_pointer: load!(c"glTexCoordPointer"),
            matrix_mode: load!(c"glMatrixMode"),
            load_matrix: load!(c"glLoadMatrixf"),
            load_identity: load!(c"glLoadIdentity"),
            fogf: load!(c"glFogf"),
            fogfv: load!(c"glFogfv"),
            fogi: load!(c"glFogi"),
            alpha_func: load!(c"glAlphaFunc"),
            gen_lists: load!(c"glGenLists"),
            new_list: load!(c"glNewList"),
            end_list: load!(c"glEndList"),
            call_list: load!(c"glCallList"),
            delete_lists: load!(c"glDeleteLists"),
            draw_elements: load!(c"glDrawElements"),
        })
    }

    pub unsafe fn enable_client_state(&self, array: u32) {
        unsafe { (self.enable_client_state)(array) }
    }

    pub unsafe fn disable_client_state(&self, array: u32) {
        unsafe { (self.disable_client_state)(array) }
    }

    pub unsafe fn vertex_pointer(&self, size: i32, ty: u32, stride: i32, ptr: *const u8) {
        unsafe { (self.vertex_pointer)(size, ty, stride, ptr.cast()) }
    }

    pub unsafe fn color_pointer(&self, size: i32, ty: u32, stride: i32, ptr: *const u8) {
        unsafe { (self.color_pointer)(size, ty, stride, ptr.cast()) }
    }

    pub unsafe fn tex_coord_pointer(&self, size: i32, ty: u32, stride: i32, ptr: *const u8) {
        unsafe { (self.tex_coord_pointer)(size, ty, stride, ptr.cast()) }
    }

    pub unsafe fn matrix_mode(&self, mode: u32) {
        unsafe { (self.matrix_mode)(mode) }
    }

    pub unsafe fn load_matrix(&self, m: &[f32; 16]) {
        unsafe { (self.load_matrix)(m.as_ptr()) }
    }

    pub unsafe fn load_identity(&self) {
        unsafe { (self.load_identity)() }
    }

    pub unsafe fn fogf(&self, pname: u32, value: f32) {
        unsafe { (self.fogf)(pname, value) }
    }

    pub unsafe fn fogfv(&self, pname: u32, value: &[f32; 4]) {
        unsafe { (self.fogfv)(pname, value.as_ptr()) }
    }

    pub unsafe fn fogi(&self, pname: u32, value: i32) {
        unsafe { (self.fogi)(pname, value) }
    }

    pub unsafe fn alpha_func(&self, func: u32, reference: f32) {
        unsafe { (self.alpha_func)(func, reference) }
    }

    /// Returns 0 when no list could be allocated.
    pub unsafe fn gen_list(&self) -> u32 {
        unsafe { (self.gen_lists)(1) }
    }

    pub unsafe fn new_list(&self, list: u32, mode: u32) {
        unsafe { (self.new_list)(list, mode) }
    }

    pub unsafe fn end_list(&self) {
        unsafe { (self.end_list)() }
    }

    pub unsafe fn call_list(&self, list: u32) {
        unsafe { (self.call_list)(list) }
    }

    pub unsafe fn delete_list(&self, list: u32) {
        unsafe { (self.delete_lists)(list, 1) }
    }

    /// `glDrawElements` reading indices from client memory.
    pub unsafe fn draw_client_elements(&self, mode: u32, indices: &[u16]) {
        unsafe {
            (self.draw_elements)(
                mode,
                indices.len() as i32,
                glow::UNSIGNED_SHORT,
                indices.as_ptr().cast(),
            )
        }
    }
}
