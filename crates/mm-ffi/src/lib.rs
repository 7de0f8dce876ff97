mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::panic::AssertUnwindSafe;

use mm_gemm::{CpuBackend, Gemm, MatrixMultiplyBackend, Transpose};

/// Execute a closure that returns an `MMStatus`, catching any panics
/// and converting them into `MMStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> MMStatus + std::panic::UnwindSafe>(f: F) -> MMStatus {
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            MMStatus::ErrorInternal
        }
    }
}

fn to_usize(name: &str, value: c_int) -> Result<usize, String> {
    usize::try_from(value).map_err(|_| format!("{name} must be non-negative, got {value}"))
}

/// Raw C arguments of one GEMM call.
struct RawGemm {
    ta: c_int,
    tb: c_int,
    m: c_int,
    n: c_int,
    k: c_int,
    alpha: f32,
    a: *const f32,
    lda: c_int,
    b: *const f32,
    ldb: c_int,
    beta: f32,
    c: *mut f32,
    ldc: c_int,
}

impl RawGemm {
    /// Validate the arguments and run them on `backend`.
    ///
    /// # Safety
    /// Non-null pointers must be valid for the extents implied by the shape,
    /// transpose flags and leading dimensions, and C must not alias A or B.
    unsafe fn run(&self, backend: &dyn MatrixMultiplyBackend) -> MMStatus {
        let parsed = (|| {
            let op = Gemm {
                trans_a: Transpose::from_flag(self.ta),
                trans_b: Transpose::from_flag(self.tb),
                m: to_usize("M", self.m)?,
                n: to_usize("N", self.n)?,
                k: to_usize("K", self.k)?,
                alpha: self.alpha,
                beta: self.beta,
            };
            let lda = to_usize("lda", self.lda)?;
            let ldb = to_usize("ldb", self.ldb)?;
            let ldc = to_usize("ldc", self.ldc)?;
            Ok::<_, String>((op, lda, ldb, ldc))
        })();
        let (op, lda, ldb, ldc) = match parsed {
            Ok(p) => p,
            Err(msg) => {
                set_last_error(msg);
                return MMStatus::ErrorInvalidArgument;
            }
        };

        let [a_len, b_len, c_len] = match op.extents(lda, ldb, ldc) {
            Ok(extents) => extents,
            Err(e) => return report(e),
        };

        let (a, b, c) = match (
            host_slice(self.a, a_len, "A"),
            host_slice(self.b, b_len, "B"),
            host_slice_mut(self.c, c_len, "C"),
        ) {
            (Ok(a), Ok(b), Ok(c)) => (a, b, c),
            (Err(msg), _, _) | (_, Err(msg), _) | (_, _, Err(msg)) => {
                set_last_error(msg);
                return MMStatus::ErrorInvalidArgument;
            }
        };

        match backend.gemm(&op, a, lda, b, ldb, c, ldc) {
            Ok(()) => MMStatus::Ok,
            Err(e) => report(e),
        }
    }
}

unsafe fn host_slice<'a>(ptr: *const f32, len: usize, name: &str) -> Result<&'a [f32], String> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

unsafe fn host_slice_mut<'a>(
    ptr: *mut f32,
    len: usize,
    name: &str,
) -> Result<&'a mut [f32], String> {
    if len == 0 {
        return Ok(&mut []);
    }
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    Ok(std::slice::from_raw_parts_mut(ptr, len))
}

/// C <- ALPHA * op(A) * op(B) + BETA * C on the host.
///
/// `TA`/`TB` follow the C convention: zero means "as stored", anything else
/// means transposed. Matrices are row-major with leading dimensions
/// `lda`, `ldb`, `ldc`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn mm_gemm(
    ta: c_int,
    tb: c_int,
    m: c_int,
    n: c_int,
    k: c_int,
    alpha: f32,
    a: *const f32,
    lda: c_int,
    b: *const f32,
    ldb: c_int,
    beta: f32,
    c: *mut f32,
    ldc: c_int,
) -> MMStatus {
    let raw = RawGemm {
        ta,
        tb,
        m,
        n,
        k,
        alpha,
        a,
        lda,
        b,
        ldb,
        beta,
        c,
        ldc,
    };
    catch_panic(move || unsafe { raw.run(&CpuBackend::new()) })
}

/// Create a new GEMM context.
///
/// On success, writes a heap-allocated `MMContext` pointer into `*ctx_out`
/// and returns `MMStatus::Ok`. The caller must later call `mm_context_destroy`
/// to free the context.
#[no_mangle]
pub extern "C" fn mm_context_create(
    backend: MMBackendType,
    ctx_out: *mut *mut MMContext,
) -> MMStatus {
    catch_panic(AssertUnwindSafe(|| {
        if ctx_out.is_null() {
            set_last_error("ctx_out is null".to_string());
            return MMStatus::ErrorInvalidArgument;
        }
        let ctx = Box::new(MMContext::new(backend.into()));
        unsafe {
            *ctx_out = Box::into_raw(ctx);
        }
        MMStatus::Ok
    }))
}

/// Destroy a context previously created by `mm_context_create`.
///
/// Passing a null pointer is a no-op and returns `MMStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn mm_context_destroy(ctx: *mut MMContext) -> MMStatus {
    if ctx.is_null() {
        return MMStatus::Ok;
    }
    drop(Box::from_raw(ctx));
    MMStatus::Ok
}

/// Name of the backend the context runs on ("cpu" or "metal").
///
/// The string is owned by the context and must not be freed.
#[no_mangle]
pub unsafe extern "C" fn mm_context_backend_name(ctx: *const MMContext) -> *const c_char {
    if ctx.is_null() {
        return std::ptr::null();
    }
    (*ctx).name().as_ptr()
}

/// Same contract as `mm_gemm`, executed on the context's backend.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn mm_context_gemm(
    ctx: *const MMContext,
    ta: c_int,
    tb: c_int,
    m: c_int,
    n: c_int,
    k: c_int,
    alpha: f32,
    a: *const f32,
    lda: c_int,
    b: *const f32,
    ldb: c_int,
    beta: f32,
    c: *mut f32,
    ldc: c_int,
) -> MMStatus {
    if ctx.is_null() {
        set_last_error("ctx is null".to_string());
        return MMStatus::ErrorInvalidArgument;
    }
    let raw = RawGemm {
        ta,
        tb,
        m,
        n,
        k,
        alpha,
        a,
        lda,
        b,
        ldb,
        beta,
        c,
        ldc,
    };
    let ctx = &*ctx;
    catch_panic(AssertUnwindSafe(move || unsafe { raw.run(ctx.backend.as_ref()) }))
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `mm_free_string`.
#[no_mangle]
pub extern "C" fn mm_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `mm_last_error`.
#[no_mangle]
pub unsafe extern "C" fn mm_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
