//! Small macros shared by the HTTP apps.

#[cfg(feature = "actix")]
pub use actix_web;

/// Generate a `routes` function registering handlers and nested scopes.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     load monitors on "/monitors",
/// }
/// ```
///
/// `route` registers an actix handler in the current scope, `load` mounts a
/// child module's own `routes` under a path prefix.
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($($kind:ident $item:ident $(on $prefix:literal)?),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::actix_web::web::ServiceConfig) {
            $($crate::routes!(@register cfg, $kind $item $(on $prefix)?);)*
        }
    };

    (@register $cfg:ident, route $handler:ident) => {
        $cfg.service($handler);
    };

    (@register $cfg:ident, load $module:ident on $prefix:literal) => {
        $cfg.service($crate::actix_web::web::scope($prefix).configure($module::routes));
    };
}
