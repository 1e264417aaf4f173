//! FFI boundary for dynamically loaded extension modules.
//!
//! A compiled extension exports a single `_extension_init` symbol that
//! returns a heap-allocated [`ExtensionVTable`]. [`FfiExtensionModule`]
//! wraps that vtable behind the safe [`ExtensionModule`] trait, keeping
//! the [`Library`] alive for as long as the wrapper exists and guarding
//! every call with `catch_unwind`.
//!
//! [`LibraryModuleLoader`] is the production [`ModuleLoader`]: it copies
//! the module file into a private temp directory before opening it, so a
//! reinstall that replaces the file on disk is picked up by the next
//! load instead of the OS handing back the already-mapped image.

use std::ffi::{c_char, c_void, CStr, CString};
use std::panic;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::Library;
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::extension_system::error::{ExtResult, ExtensionSystemError};
use crate::extension_system::manifest::ExtensionManifest;
use crate::extension_system::module::{
    ExtensionModule, ExtensionRequest, ExtensionResponse, InjectOptions, ModuleLoader,
};
use crate::extension_system::record::HydratedExtension;
use crate::extension_system::store::ContentRepository;
use crate::kernel::constants::{module_file_name, MODULE_INIT_SYMBOL};

/// Status codes crossing the FFI boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    Ok = 0,
    NullPointer = 1,
    Utf8Error = 2,
    OperationFailed = 3,
}

/// Callback handed to install/uninstall hooks for running SQL against
/// the host's content repository. `params_json` is a JSON array of bind
/// values; on success `*out_json` receives a host-allocated result
/// object the module must not free.
pub type SqlExecFn = extern "C" fn(
    ctx: *mut c_void,
    sql: *const c_char,
    params_json: *const c_char,
    out_json: *mut *mut c_char,
) -> FfiResult;

/// The capability table a module's `_extension_init` returns.
///
/// `instance`, `destroy`, `manifest_json` and `free_string` are
/// mandatory; every other entry is optional and `None` means the module
/// does not provide that capability. All out-strings are allocated by
/// the module and released through `free_string`.
#[repr(C)]
pub struct ExtensionVTable {
    pub instance: *mut c_void,
    pub destroy: extern "C" fn(instance: *mut c_void),
    pub manifest_json: extern "C" fn(instance: *const c_void) -> *mut c_char,
    pub free_string: extern "C" fn(ptr: *mut c_char),

    pub install:
        Option<extern "C" fn(instance: *mut c_void, exec: SqlExecFn, ctx: *mut c_void) -> FfiResult>,
    pub uninstall:
        Option<extern "C" fn(instance: *mut c_void, exec: SqlExecFn, ctx: *mut c_void) -> FfiResult>,
    pub handle_route: Option<
        extern "C" fn(
            instance: *mut c_void,
            request_json: *const c_char,
            out_json: *mut *mut c_char,
        ) -> FfiResult,
    >,
    pub render_shortcode: Option<
        extern "C" fn(
            instance: *const c_void,
            name: *const c_char,
            attrs_json: *const c_char,
            context_json: *const c_char,
            out_html: *mut *mut c_char,
        ) -> FfiResult,
    >,
    pub render_element: Option<
        extern "C" fn(
            instance: *const c_void,
            element_json: *const c_char,
            context_json: *const c_char,
            out_html: *mut *mut c_char,
        ) -> FfiResult,
    >,
    pub load_data: Option<
        extern "C" fn(
            instance: *const c_void,
            input_json: *const c_char,
            out_json: *mut *mut c_char,
        ) -> FfiResult,
    >,
    pub inject_scripts: Option<
        extern "C" fn(instance: *const c_void, extension_json: *const c_char, include_admin: bool) -> bool,
    >,
}

/// Signature of the exported init symbol.
pub type ExtensionInitFn = unsafe extern "C" fn() -> *mut ExtensionVTable;

/// Safely converts an FFI C string pointer to a Rust String.
/// # Safety
/// `ptr` must be a valid pointer to a null-terminated, UTF-8 encoded C
/// string that stays valid for the duration of the call.
unsafe fn ffi_string_from_ptr(ptr: *const c_char) -> std::result::Result<String, FfiResult> {
    if ptr.is_null() {
        return Err(FfiResult::NullPointer);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| s.to_owned())
        .map_err(|_| FfiResult::Utf8Error)
}

fn ffi_error(slug: &str, operation: &str, detail: impl std::fmt::Debug) -> ExtensionSystemError {
    ExtensionSystemError::Ffi {
        slug: slug.to_string(),
        operation: operation.to_string(),
        message: format!("{:?}", detail),
    }
}

fn to_cstring(slug: &str, operation: &str, value: &Value) -> ExtResult<CString> {
    CString::new(value.to_string()).map_err(|e| ffi_error(slug, operation, e))
}

/// Context handed through the SQL callback. Holds the fat trait
/// reference so the FFI side only ever sees a thin pointer to this
/// struct.
struct RepoCtx<'a> {
    repo: &'a dyn ContentRepository,
}

extern "C" fn repo_exec(
    ctx: *mut c_void,
    sql: *const c_char,
    params_json: *const c_char,
    out_json: *mut *mut c_char,
) -> FfiResult {
    let result = panic::catch_unwind(|| {
        if ctx.is_null() || sql.is_null() {
            return Err(FfiResult::NullPointer);
        }
        let ctx = unsafe { &*(ctx as *const RepoCtx<'_>) };
        let sql = unsafe { ffi_string_from_ptr(sql) }?;
        let params: Vec<Value> = if params_json.is_null() {
            Vec::new()
        } else {
            let raw = unsafe { ffi_string_from_ptr(params_json) }?;
            serde_json::from_str(&raw).map_err(|_| FfiResult::OperationFailed)?
        };
        let changes = ctx
            .repo
            .run(&sql, &params)
            .map_err(|_| FfiResult::OperationFailed)?;
        Ok(serde_json::json!({ "changes": changes }))
    });
    match result {
        Ok(Ok(body)) => {
            if !out_json.is_null() {
                match CString::new(body.to_string()) {
                    Ok(cstring) => unsafe { *out_json = cstring.into_raw() },
                    Err(_) => return FfiResult::OperationFailed,
                }
            }
            FfiResult::Ok
        }
        Ok(Err(code)) => code,
        Err(_) => FfiResult::OperationFailed,
    }
}

#[derive(Debug, Clone, Copy)]
struct UnsafeVTablePtr(*const ExtensionVTable);
unsafe impl Send for UnsafeVTablePtr {}
unsafe impl Sync for UnsafeVTablePtr {}

/// Safe wrapper over a module vtable.
pub struct FfiExtensionModule {
    vtable: UnsafeVTablePtr,
    // Declared after the vtable so the image outlives every use of it;
    // dropped explicitly in Drop after destroy runs.
    library: Option<Library>,
    // Keeps the shadow copy directory alive for the library's lifetime.
    _shadow: Option<TempDir>,
    manifest_cache: ExtensionManifest,
    slug: String,
}

impl std::fmt::Debug for FfiExtensionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfiExtensionModule")
            .field("slug", &self.slug)
            .finish()
    }
}

impl FfiExtensionModule {
    /// # Safety
    /// `vtable_ptr` must be the pointer returned by the library's
    /// `_extension_init`, allocated with `Box::into_raw`, and `library`
    /// must be the library it came from.
    unsafe fn new(
        vtable_ptr: *mut ExtensionVTable,
        library: Library,
        shadow: Option<TempDir>,
        path: &Path,
    ) -> ExtResult<Self> {
        if vtable_ptr.is_null() {
            drop(library);
            return Err(ExtensionSystemError::ModuleLoad {
                path: path.to_path_buf(),
                message: "module init returned a null vtable".to_string(),
            });
        }

        let vtable_ref = unsafe { &*vtable_ptr };
        let manifest_ptr = (vtable_ref.manifest_json)(vtable_ref.instance as *const c_void);
        let manifest_raw = unsafe { ffi_string_from_ptr(manifest_ptr) };
        if !manifest_ptr.is_null() {
            (vtable_ref.free_string)(manifest_ptr);
        }
        let manifest_raw = manifest_raw.map_err(|e| ExtensionSystemError::ModuleLoad {
            path: path.to_path_buf(),
            message: format!("reading module manifest: {:?}", e),
        })?;
        let manifest_value: Value =
            serde_json::from_str(&manifest_raw).map_err(|e| ExtensionSystemError::ModuleLoad {
                path: path.to_path_buf(),
                message: format!("module manifest is not valid JSON: {e}"),
            })?;
        let manifest = ExtensionManifest::from_value(manifest_value).map_err(|e| {
            ExtensionSystemError::ModuleLoad {
                path: path.to_path_buf(),
                message: format!("module manifest rejected: {e}"),
            }
        })?;

        Ok(Self {
            vtable: UnsafeVTablePtr(vtable_ptr),
            library: Some(library),
            _shadow: shadow,
            slug: manifest.slug.clone(),
            manifest_cache: manifest,
        })
    }

    fn vtable(&self) -> &ExtensionVTable {
        unsafe { &*self.vtable.0 }
    }

    /// Run one guarded FFI call that writes a string through an out
    /// parameter, returning the decoded string (or `None` when the
    /// module left the out pointer null).
    fn call_out_string<F>(&self, operation: &str, call: F) -> ExtResult<Option<String>>
    where
        F: FnOnce(&ExtensionVTable, *mut *mut c_char) -> FfiResult,
    {
        let mut out: *mut c_char = std::ptr::null_mut();
        let code = panic::catch_unwind(panic::AssertUnwindSafe(|| call(self.vtable(), &mut out)))
            .map_err(|_| ffi_error(&self.slug, operation, "module panicked"))?;
        if code != FfiResult::Ok {
            if !out.is_null() {
                (self.vtable().free_string)(out);
            }
            return Err(ffi_error(&self.slug, operation, code));
        }
        if out.is_null() {
            return Ok(None);
        }
        let decoded = unsafe { ffi_string_from_ptr(out) };
        (self.vtable().free_string)(out);
        decoded
            .map(Some)
            .map_err(|e| ffi_error(&self.slug, operation, e))
    }

    fn run_hook(
        &self,
        operation: &str,
        hook: Option<extern "C" fn(*mut c_void, SqlExecFn, *mut c_void) -> FfiResult>,
        repo: &dyn ContentRepository,
    ) -> ExtResult<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        let mut ctx = RepoCtx { repo };
        let instance = self.vtable().instance;
        let code = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            hook(instance, repo_exec, &mut ctx as *mut RepoCtx<'_> as *mut c_void)
        }))
        .map_err(|_| ffi_error(&self.slug, operation, "module panicked"))?;
        if code != FfiResult::Ok {
            return Err(ExtensionSystemError::Hook {
                slug: self.slug.clone(),
                operation: operation.to_string(),
                message: format!("{:?}", code),
            });
        }
        Ok(())
    }
}

impl Drop for FfiExtensionModule {
    fn drop(&mut self) {
        unsafe {
            if !self.vtable.0.is_null() {
                let vtable_ref = &*self.vtable.0;
                (vtable_ref.destroy)(vtable_ref.instance);
                let _vtable_box = Box::from_raw(self.vtable.0 as *mut ExtensionVTable);
                self.vtable.0 = std::ptr::null();
            }
            drop(self.library.take());
        }
    }
}

#[async_trait]
impl ExtensionModule for FfiExtensionModule {
    fn manifest(&self) -> ExtResult<ExtensionManifest> {
        Ok(self.manifest_cache.clone())
    }

    async fn on_install(&self, repo: &dyn ContentRepository) -> ExtResult<()> {
        self.run_hook("install", self.vtable().install, repo)
    }

    async fn on_uninstall(&self, repo: &dyn ContentRepository) -> ExtResult<()> {
        self.run_hook("uninstall", self.vtable().uninstall, repo)
    }

    async fn handle_route(&self, request: ExtensionRequest) -> ExtResult<ExtensionResponse> {
        let Some(handler) = self.vtable().handle_route else {
            return Err(self.not_supported("handle_route"));
        };
        let request_value =
            serde_json::to_value(&request).map_err(|e| ffi_error(&self.slug, "handle_route", e))?;
        let request_cstr = to_cstring(&self.slug, "handle_route", &request_value)?;
        let instance = self.vtable().instance;
        let raw = self
            .call_out_string("handle_route", |_, out| {
                handler(instance, request_cstr.as_ptr(), out)
            })?
            .ok_or_else(|| ffi_error(&self.slug, "handle_route", "module returned no response"))?;
        serde_json::from_str(&raw).map_err(|e| ffi_error(&self.slug, "handle_route", e))
    }

    fn render_shortcode(&self, name: &str, attrs: &Map<String, Value>, context: &Value) -> ExtResult<String> {
        let Some(renderer) = self.vtable().render_shortcode else {
            return Err(self.not_supported("render_shortcode"));
        };
        let name_cstr =
            CString::new(name).map_err(|e| ffi_error(&self.slug, "render_shortcode", e))?;
        let attrs_cstr =
            to_cstring(&self.slug, "render_shortcode", &Value::Object(attrs.clone()))?;
        let context_cstr = to_cstring(&self.slug, "render_shortcode", context)?;
        let instance = self.vtable().instance as *const c_void;
        Ok(self
            .call_out_string("render_shortcode", |_, out| {
                renderer(instance, name_cstr.as_ptr(), attrs_cstr.as_ptr(), context_cstr.as_ptr(), out)
            })?
            .unwrap_or_default())
    }

    fn render_element(&self, element: &Value, context: &Value) -> ExtResult<String> {
        let Some(renderer) = self.vtable().render_element else {
            return Err(self.not_supported("render_element"));
        };
        let element_cstr = to_cstring(&self.slug, "render_element", element)?;
        let context_cstr = to_cstring(&self.slug, "render_element", context)?;
        let instance = self.vtable().instance as *const c_void;
        Ok(self
            .call_out_string("render_element", |_, out| {
                renderer(instance, element_cstr.as_ptr(), context_cstr.as_ptr(), out)
            })?
            .unwrap_or_default())
    }

    async fn load_client_data(&self, content: &Value, layout: &Value, context: &Value) -> ExtResult<Value> {
        let Some(loader) = self.vtable().load_data else {
            return Ok(Value::Null);
        };
        let input = serde_json::json!({
            "content": content,
            "layout": layout,
            "context": context,
        });
        let input_cstr = to_cstring(&self.slug, "load_data", &input)?;
        let instance = self.vtable().instance as *const c_void;
        let raw = self.call_out_string("load_data", |_, out| loader(instance, input_cstr.as_ptr(), out))?;
        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ffi_error(&self.slug, "load_data", e)),
            None => Ok(Value::Null),
        }
    }

    fn inject_scripts(&self, extension: &HydratedExtension, options: InjectOptions) -> bool {
        let Some(injector) = self.vtable().inject_scripts else {
            return false;
        };
        let Ok(extension_value) = serde_json::to_value(extension) else {
            return false;
        };
        let Ok(extension_cstr) = CString::new(extension_value.to_string()) else {
            return false;
        };
        let instance = self.vtable().instance as *const c_void;
        panic::catch_unwind(panic::AssertUnwindSafe(|| {
            injector(instance, extension_cstr.as_ptr(), options.include_admin)
        }))
        .unwrap_or(false)
    }
}

/// Loads compiled extension modules with `libloading`.
#[derive(Debug, Default)]
pub struct LibraryModuleLoader;

impl LibraryModuleLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for LibraryModuleLoader {
    fn load(&self, dir: &Path) -> ExtResult<Option<Arc<dyn ExtensionModule>>> {
        let module_path = dir.join(module_file_name());
        if !module_path.is_file() {
            return Ok(None);
        }

        // Shadow-copy before opening so a later reinstall replaces the
        // file on disk without fighting the loaded image.
        let shadow = TempDir::new().map_err(|e| {
            ExtensionSystemError::io(e, "creating module shadow dir", module_path.clone())
        })?;
        let shadow_path = shadow.path().join(module_file_name());
        std::fs::copy(&module_path, &shadow_path).map_err(|e| {
            ExtensionSystemError::io(e, "shadow-copying module", module_path.clone())
        })?;

        let library = unsafe { Library::new(&shadow_path) }.map_err(|e| {
            ExtensionSystemError::ModuleLoad {
                path: module_path.clone(),
                message: format!("opening library: {e}"),
            }
        })?;

        let init: libloading::Symbol<'_, ExtensionInitFn> =
            unsafe { library.get(MODULE_INIT_SYMBOL) }.map_err(|e| {
                ExtensionSystemError::ModuleLoad {
                    path: module_path.clone(),
                    message: format!("missing init symbol: {e}"),
                }
            })?;

        let vtable_ptr = panic::catch_unwind(|| unsafe { init() }).map_err(|_| {
            ExtensionSystemError::ModuleLoad {
                path: module_path.clone(),
                message: "module init panicked".to_string(),
            }
        })?;
        drop(init);

        let module = unsafe {
            FfiExtensionModule::new(vtable_ptr, library, Some(shadow), &module_path)?
        };
        Ok(Some(Arc::new(module)))
    }
}
