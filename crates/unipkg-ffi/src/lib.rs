use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lazy_static::lazy_static;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, Runtime};
use unipkg_core::Engine;
use unipkg_core::logging::init_tracing;
use unipkg_core::models::{
    CoreError, InstallationOptions, ManagerId, OperationKind, Package, TaskId, UpgradablePackage,
};
use unipkg_core::orchestration::{AggregateItem, AggregateResult, AggregateRun};

struct UnipkgState {
    engine: Arc<Engine>,
    runtime: Runtime,
}

lazy_static! {
    static ref STATE: Mutex<Option<UnipkgState>> = Mutex::new(None);
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AggregatePayload<T> {
    items: Vec<T>,
    completed: Vec<ManagerId>,
    errors: Vec<CoreError>,
}

impl<T> From<AggregateResult<T>> for AggregatePayload<T> {
    fn from(result: AggregateResult<T>) -> Self {
        Self {
            items: result.items,
            completed: result.completed,
            errors: result.errors.into_iter().map(|(_, error)| error).collect(),
        }
    }
}

fn lock_state() -> MutexGuard<'static, Option<UnipkgState>> {
    STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Engine and runtime handle, cloned out so no call blocks while holding
/// the global lock.
fn engine() -> Option<(Arc<Engine>, Handle)> {
    lock_state()
        .as_ref()
        .map(|state| (state.engine.clone(), state.runtime.handle().clone()))
}

fn to_json_ptr<T: Serialize>(value: &T) -> *mut c_char {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!(error = %error, "failed to serialize ffi payload");
            return std::ptr::null_mut();
        }
    };
    match CString::new(json) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// `raw` must be null or a valid NUL-terminated C string.
unsafe fn read_str<'a>(raw: *const c_char) -> Option<&'a str> {
    if raw.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(raw) }.to_str().ok()
}

/// # Safety
///
/// `raw` must be null or a valid NUL-terminated C string.
unsafe fn read_json<T: DeserializeOwned>(raw: *const c_char) -> Option<T> {
    let text = unsafe { read_str(raw) }?;
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(error = %error, "rejected malformed ffi json argument");
            None
        }
    }
}

fn collect_run<T: AggregateItem + Serialize>(handle: &Handle, run: AggregateRun<T>) -> *mut c_char {
    let result = handle.block_on(run.collect());
    to_json_ptr(&AggregatePayload::from(result))
}

/// Initialize the engine with the given settings directory.
///
/// # Safety
///
/// `settings_dir` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_init(settings_dir: *const c_char) -> bool {
    let Some(settings_dir) = (unsafe { read_str(settings_dir) }) else {
        return false;
    };

    let mut guard = lock_state();
    if guard.is_some() {
        return true;
    }

    init_tracing("unipkg_core=info,unipkg_ffi=info");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(error) => {
            tracing::error!(error = %error, "failed to create tokio runtime");
            return false;
        }
    };

    let engine = match Engine::open(settings_dir) {
        Ok(engine) => Arc::new(engine),
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "failed to open engine");
            return false;
        }
    };

    *guard = Some(UnipkgState { engine, runtime });
    true
}

/// Stops the engine. Running operations are abandoned.
#[unsafe(no_mangle)]
pub extern "C" fn unipkg_shutdown() {
    let state = lock_state().take();
    if let Some(state) = state {
        state.runtime.shutdown_timeout(Duration::from_secs(5));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_detect_managers() -> *mut c_char {
    let Some((engine, handle)) = engine() else {
        return std::ptr::null_mut();
    };
    let statuses = handle.block_on(engine.aggregator().detect_managers());
    to_json_ptr(&statuses)
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_list_installed() -> *mut c_char {
    let Some((engine, handle)) = engine() else {
        return std::ptr::null_mut();
    };
    let run = {
        let _entered = handle.enter();
        engine.aggregator().list_installed()
    };
    collect_run(&handle, run)
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_list_updates() -> *mut c_char {
    let Some((engine, handle)) = engine() else {
        return std::ptr::null_mut();
    };
    let run = {
        let _entered = handle.enter();
        engine.aggregator().list_updates()
    };
    collect_run(&handle, run)
}

/// # Safety
///
/// `query` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_search(query: *const c_char) -> *mut c_char {
    let Some(query) = (unsafe { read_str(query) }) else {
        return std::ptr::null_mut();
    };
    let Some((engine, handle)) = engine() else {
        return std::ptr::null_mut();
    };
    let run = {
        let _entered = handle.enter();
        engine.aggregator().search(query)
    };
    collect_run(&handle, run)
}

/// Details for a package given as JSON.
///
/// # Safety
///
/// `package_json` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_package_details(package_json: *const c_char) -> *mut c_char {
    let Some(package) = (unsafe { read_json::<Package>(package_json) }) else {
        return std::ptr::null_mut();
    };
    let Some((engine, handle)) = engine() else {
        return std::ptr::null_mut();
    };
    match handle.block_on(engine.aggregator().details(&package)) {
        Ok(details) => to_json_ptr(&details),
        Err(error) => {
            tracing::warn!(manager = ?package.manager, kind = ?error.kind, message = %error.message, "details unavailable");
            std::ptr::null_mut()
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_list_sources() -> *mut c_char {
    let Some((engine, handle)) = engine() else {
        return std::ptr::null_mut();
    };
    let sources = handle.block_on(engine.aggregator().load_sources());
    to_json_ptr(&sources)
}

/// # Safety
///
/// Both arguments must be null or valid NUL-terminated UTF-8 C strings.
unsafe fn start_operation(
    kind: OperationKind,
    package_json: *const c_char,
    options_json: *const c_char,
) -> i64 {
    let Some(package) = (unsafe { read_json::<Package>(package_json) }) else {
        return -1;
    };
    let options = if options_json.is_null() {
        None
    } else {
        match unsafe { read_json::<InstallationOptions>(options_json) } {
            Some(options) => Some(options),
            None => return -1,
        }
    };
    let Some((engine, handle)) = engine() else {
        return -1;
    };

    match handle.block_on(engine.start_operation(kind, package, options)) {
        Ok(operation) => operation.id.0 as i64,
        Err(error) => {
            tracing::error!(
                manager = ?error.manager,
                kind = ?error.kind,
                message = %error.message,
                "failed to start {}",
                kind.label()
            );
            -1
        }
    }
}

/// Queues an installation and returns its operation id, or -1.
///
/// # Safety
///
/// `package_json` must be a valid NUL-terminated UTF-8 C string; `options_json`
/// may be null to use the package's saved options.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_install(
    package_json: *const c_char,
    options_json: *const c_char,
) -> i64 {
    unsafe { start_operation(OperationKind::Install, package_json, options_json) }
}

/// # Safety
///
/// See `unipkg_install`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_update(
    package_json: *const c_char,
    options_json: *const c_char,
) -> i64 {
    unsafe { start_operation(OperationKind::Update, package_json, options_json) }
}

/// # Safety
///
/// See `unipkg_install`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_uninstall(
    package_json: *const c_char,
    options_json: *const c_char,
) -> i64 {
    unsafe { start_operation(OperationKind::Uninstall, package_json, options_json) }
}

/// JSON snapshot of an operation: state, progress, output lines and result.
#[unsafe(no_mangle)]
pub extern "C" fn unipkg_poll_operation(operation_id: u64) -> *mut c_char {
    let Some((engine, _)) = engine() else {
        return std::ptr::null_mut();
    };
    match engine.coordinator().snapshot(TaskId(operation_id)) {
        Some(snapshot) => to_json_ptr(&snapshot),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_cancel_operation(operation_id: u64) -> bool {
    engine().is_some_and(|(engine, _)| engine.coordinator().cancel(TaskId(operation_id)))
}

/// # Safety
///
/// `update_json` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_ignore_update(
    update_json: *const c_char,
    skip_version_only: bool,
) -> bool {
    let Some(update) = (unsafe { read_json::<UpgradablePackage>(update_json) }) else {
        return false;
    };
    let Some((engine, _)) = engine() else {
        return false;
    };
    match engine.ignore_update(&update, skip_version_only) {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "failed to ignore update");
            false
        }
    }
}

/// # Safety
///
/// `id` and `source` must be valid, non-null pointers to NUL-terminated UTF-8 C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_unignore_update(id: *const c_char, source: *const c_char) -> bool {
    let (Some(id), Some(source)) = (unsafe { read_str(id) }, unsafe { read_str(source) }) else {
        return false;
    };
    let Some((engine, _)) = engine() else {
        return false;
    };
    match engine.unignore_update(id, source) {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "failed to unignore update");
            false
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_list_ignored_updates() -> *mut c_char {
    let Some((engine, _)) = engine() else {
        return std::ptr::null_mut();
    };
    match engine.ignored_updates() {
        Ok(records) => to_json_ptr(&records),
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "failed to list ignored updates");
            std::ptr::null_mut()
        }
    }
}

/// Enables or disables a manager by display name (for example `Winget` or
/// `.NET Tool`). The change is saved to the settings directory.
///
/// # Safety
///
/// `manager` must be a valid, non-null pointer to a NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_set_manager_enabled(manager: *const c_char, enabled: bool) -> bool {
    let Some(manager) = (unsafe { read_str(manager) }).and_then(ManagerId::from_display_name)
    else {
        return false;
    };
    let Some((engine, _)) = engine() else {
        return false;
    };
    match engine.set_manager_enabled(manager, enabled) {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(manager = ?manager, kind = ?error.kind, message = %error.message, "failed to save manager state");
            false
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn unipkg_operation_history() -> *mut c_char {
    let Some((engine, _)) = engine() else {
        return std::ptr::null_mut();
    };
    match engine.history() {
        Ok(entries) => to_json_ptr(&entries),
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "failed to read history");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by a `unipkg_*` function.
///
/// # Safety
///
/// `s` must be a pointer previously returned by a `unipkg_*` function, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unipkg_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}
