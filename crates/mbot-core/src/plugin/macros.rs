/// Registers a module with the link-time registry.
///
/// The module becomes visible to [`ModuleCatalog::linked`] under `$name`.
/// `$create` is a `fn() -> StaticModule` called each time the module is
/// opened.
///
/// ```rust,ignore
/// fn create() -> StaticModule {
///     StaticModule::new("echo")
///         .export("SetChannels", EntryPoint::set_channels(|_, _, _| {}))
/// }
///
/// register_module!(ECHO_MODULE, "echo", create);
/// ```
///
/// A crate that only registers modules must still be referenced from the
/// final binary (`use my_plugin as _;`), otherwise the linker drops it.
///
/// [`ModuleCatalog::linked`]: crate::plugin::ModuleCatalog::linked
#[macro_export]
macro_rules! register_module {
    ($ident:ident, $name:literal, $create:path) => {
        #[$crate::linkme::distributed_slice($crate::plugin::MODULES)]
        #[linkme(crate = $crate::linkme)]
        static $ident: $crate::plugin::ModuleDescriptor = $crate::plugin::ModuleDescriptor {
            name: $name,
            create: $create,
        };
    };
}
