//! Kernel binding
//!
//! After a successful compile, every device gets a fresh module loaded from
//! the new PTX (the previous module is unloaded, never patched), and every
//! extracted symbol gets its per-device function pointer re-resolved.
//!
//! Registration is the cross-invocation policy: a symbol seen for the first
//! time creates a named handle per device; a symbol already registered keeps
//! its handle identity but still has its pointers refreshed, because a
//! pointer into a replaced module must never be reused.

use std::collections::HashSet;

use tracing::debug;

use crate::compile::CompiledArtifact;
use crate::demangle::Demangle;
use crate::device::DeviceContext;
use crate::driver::{DeviceApi, Function, Module};
use crate::error::Result;

// ============================================================================
// Handles
// ============================================================================

/// A registered kernel: identity persists for the session lifetime, the
/// per-device function pointers are refreshed on every recompile.
#[derive(Debug, Clone)]
pub struct KernelHandle {
    /// Exported mangled symbol
    pub mangled: String,
    /// Demangled display name (without any device suffix)
    pub display_name: String,
    /// Current function pointer per device, in device order
    pub functions: Vec<Function>,
}

/// One device's view of a bound kernel
#[derive(Debug, Clone)]
pub struct KernelBinding {
    /// Device ordinal the binding belongs to
    pub device: i32,
    /// Host-facing handle name; carries a `_GPU<i>` suffix iff more than
    /// one device is present
    pub name: String,
    /// Entry point resolved against this device's current module
    pub function: Function,
}

/// A symbol's outcome from one invocation's bind pass
#[derive(Debug, Clone)]
pub struct BoundKernel {
    /// Exported mangled symbol
    pub mangled: String,
    /// Demangled display name
    pub display_name: String,
    /// Whether this invocation registered the symbol for the first time
    pub newly_registered: bool,
    /// Per-device bindings in device order
    pub bindings: Vec<KernelBinding>,
}

// ============================================================================
// Binding
// ============================================================================

/// Load the artifact into every device and bind all extracted symbols.
///
/// Devices are processed in order; each device's context is made current
/// before its device-scoped calls. Already-registered symbols skip handle
/// creation but still refresh their function pointers.
///
/// # Errors
///
/// Returns the first driver error. Modules already replaced on earlier
/// devices stay replaced; registration state is only updated per symbol
/// after its pointers resolve on every device.
pub fn bind_artifact(
    api: &dyn DeviceApi,
    devices: &mut [DeviceContext],
    registered: &mut HashSet<String>,
    kernels: &mut Vec<KernelHandle>,
    demangler: &dyn Demangle,
    symbols: &[String],
    artifact: &CompiledArtifact,
) -> Result<Vec<BoundKernel>> {
    let ptx = artifact.ptx_text();
    let modules = reload_modules(api, devices, &ptx)?;

    let multi_device = devices.len() > 1;
    let mut bound = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let display_name = demangler.demangle(symbol);
        let newly_registered = !registered.contains(symbol);

        let mut functions = Vec::with_capacity(devices.len());
        let mut bindings = Vec::with_capacity(devices.len());
        for (device, module) in devices.iter().zip(&modules) {
            api.make_current(device.context)?;
            let function = api.get_function(*module, symbol)?;
            let name = if multi_device {
                format!("{display_name}_GPU{}", device.ordinal)
            } else {
                display_name.clone()
            };
            functions.push(function);
            bindings.push(KernelBinding {
                device: device.ordinal,
                name,
                function,
            });
        }

        if newly_registered {
            debug!(symbol, display = display_name, "registering kernel");
            registered.insert(symbol.clone());
            kernels.push(KernelHandle {
                mangled: symbol.clone(),
                display_name: display_name.clone(),
                functions,
            });
        } else if let Some(handle) = kernels.iter_mut().find(|k| k.mangled == *symbol) {
            handle.functions = functions;
        }

        bound.push(BoundKernel {
            mangled: symbol.clone(),
            display_name,
            newly_registered,
            bindings,
        });
    }
    Ok(bound)
}

/// Replace every device's module with a fresh load of the new PTX
fn reload_modules(
    api: &dyn DeviceApi,
    devices: &mut [DeviceContext],
    ptx: &str,
) -> Result<Vec<Module>> {
    let mut modules = Vec::with_capacity(devices.len());
    for device in devices.iter_mut() {
        api.make_current(device.context)?;
        if let Some(old) = device.module.take() {
            api.unload_module(old)?;
        }
        let module = api.load_module(ptx)?;
        device.module = Some(module);
        modules.push(module);
    }
    Ok(modules)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demangle::PrefixLengthDemangler;
    use crate::driver::{Context, Device};
    use std::cell::RefCell;
    use std::ffi::c_void;

    /// Tracks context activation and hands out generation-tagged modules so
    /// tests can tell which module a function was resolved against.
    struct TrackingDevices {
        current: RefCell<*mut c_void>,
        next_module: RefCell<usize>,
        unloaded: RefCell<Vec<Module>>,
        resolutions: RefCell<Vec<(Module, String, *mut c_void)>>,
    }

    impl TrackingDevices {
        fn new() -> Self {
            Self {
                current: RefCell::new(std::ptr::null_mut()),
                next_module: RefCell::new(0x100),
                unloaded: RefCell::new(Vec::new()),
                resolutions: RefCell::new(Vec::new()),
            }
        }
    }

    impl DeviceApi for TrackingDevices {
        fn init(&self) -> Result<()> {
            Ok(())
        }
        fn device_count(&self) -> Result<i32> {
            Ok(0)
        }
        fn device(&self, ordinal: i32) -> Result<Device> {
            Ok(Device::from_raw(ordinal))
        }
        fn device_name(&self, _device: Device) -> Result<String> {
            Ok("mock".to_string())
        }
        fn compute_capability(&self, _device: Device) -> Result<(i32, i32)> {
            Ok((8, 0))
        }
        fn create_context(&self, _device: Device) -> Result<Context> {
            Ok(Context::from_raw(std::ptr::null_mut()))
        }
        fn make_current(&self, context: Context) -> Result<()> {
            *self.current.borrow_mut() = context.as_raw();
            Ok(())
        }
        fn load_module(&self, _ptx: &str) -> Result<Module> {
            let mut next = self.next_module.borrow_mut();
            *next += 1;
            Ok(Module::from_raw(*next as *mut c_void))
        }
        fn unload_module(&self, module: Module) -> Result<()> {
            self.unloaded.borrow_mut().push(module);
            Ok(())
        }
        fn get_function(&self, module: Module, symbol: &str) -> Result<Function> {
            let current = *self.current.borrow();
            self.resolutions
                .borrow_mut()
                .push((module, symbol.to_string(), current));
            let raw = module.as_raw() as usize + symbol.len();
            Ok(Function::from_raw(raw as *mut c_void))
        }
    }

    fn fake_devices(count: i32) -> Vec<DeviceContext> {
        (0..count)
            .map(|ordinal| DeviceContext {
                ordinal,
                name: format!("GPU {ordinal}"),
                compute_capability: (8, 0),
                device: Device::from_raw(ordinal),
                context: Context::from_raw((0x1000 + ordinal as usize) as *mut c_void),
                module: None,
            })
            .collect()
    }

    fn artifact() -> CompiledArtifact {
        CompiledArtifact::from_ptx_bytes(1, b".version 8.3\n")
    }

    #[test]
    fn test_multi_device_names_carry_suffix() {
        let api = TrackingDevices::new();
        let mut devices = fake_devices(2);
        let mut registered = HashSet::new();
        let mut kernels = Vec::new();
        let bound = bind_artifact(
            &api,
            &mut devices,
            &mut registered,
            &mut kernels,
            &PrefixLengthDemangler,
            &["_Z3addPfS_".to_string()],
            &artifact(),
        )
        .unwrap();
        let names: Vec<&str> = bound[0].bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["add__PfS__GPU0", "add__PfS__GPU1"]);
    }

    #[test]
    fn test_single_device_name_unsuffixed() {
        let api = TrackingDevices::new();
        let mut devices = fake_devices(1);
        let mut registered = HashSet::new();
        let mut kernels = Vec::new();
        let bound = bind_artifact(
            &api,
            &mut devices,
            &mut registered,
            &mut kernels,
            &PrefixLengthDemangler,
            &["_Z3addPfS_".to_string()],
            &artifact(),
        )
        .unwrap();
        assert_eq!(bound[0].bindings[0].name, "add__PfS_");
    }

    #[test]
    fn test_rebind_refreshes_pointers_without_duplicating_handles() {
        let api = TrackingDevices::new();
        let mut devices = fake_devices(1);
        let mut registered = HashSet::new();
        let mut kernels = Vec::new();
        let symbols = vec!["_Z3addPfS_".to_string()];

        let first = bind_artifact(
            &api,
            &mut devices,
            &mut registered,
            &mut kernels,
            &PrefixLengthDemangler,
            &symbols,
            &artifact(),
        )
        .unwrap();
        let second = bind_artifact(
            &api,
            &mut devices,
            &mut registered,
            &mut kernels,
            &PrefixLengthDemangler,
            &symbols,
            &artifact(),
        )
        .unwrap();

        assert!(first[0].newly_registered);
        assert!(!second[0].newly_registered);
        assert_eq!(kernels.len(), 1);
        // New module each bind, so the refreshed pointer differs
        assert_ne!(
            first[0].bindings[0].function,
            second[0].bindings[0].function
        );
        assert_eq!(kernels[0].functions, vec![second[0].bindings[0].function]);
    }

    #[test]
    fn test_previous_module_unloaded_on_rebind() {
        let api = TrackingDevices::new();
        let mut devices = fake_devices(2);
        let mut registered = HashSet::new();
        let mut kernels = Vec::new();
        let symbols = vec!["_Z3addPfS_".to_string()];
        for _ in 0..2 {
            bind_artifact(
                &api,
                &mut devices,
                &mut registered,
                &mut kernels,
                &PrefixLengthDemangler,
                &symbols,
                &artifact(),
            )
            .unwrap();
        }
        // First bind had nothing to unload; second replaced both modules
        assert_eq!(api.unloaded.borrow().len(), 2);
    }

    #[test]
    fn test_resolution_happens_under_each_devices_context() {
        let api = TrackingDevices::new();
        let mut devices = fake_devices(2);
        let mut registered = HashSet::new();
        let mut kernels = Vec::new();
        bind_artifact(
            &api,
            &mut devices,
            &mut registered,
            &mut kernels,
            &PrefixLengthDemangler,
            &["_Z3addPfS_".to_string()],
            &artifact(),
        )
        .unwrap();

        let resolutions = api.resolutions.borrow();
        assert_eq!(resolutions.len(), 2);
        // Each resolution ran with that device's context current, against
        // that device's own module
        assert_eq!(resolutions[0].2, devices[0].context.as_raw());
        assert_eq!(resolutions[1].2, devices[1].context.as_raw());
        assert_ne!(resolutions[0].0, resolutions[1].0);
    }
}
