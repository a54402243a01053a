/// Keyword-argument syntax for [`Enumerator::match_many`].
///
/// `subsystem`, `sys_name`, `tag`, and `parent` are routed to their
/// dedicated filters; every other keyword becomes a property filter:
///
/// ```
/// use sysdev::match_many;
/// use sysdev::memory::MemoryRegistry;
/// use sysdev::registry::Context;
///
/// # fn main() -> anyhow::Result<()> {
/// let context = Context::with_backend(MemoryRegistry::from_export(
///     r#"
/// P: /devices/platform/serial8250
/// E: SUBSYSTEM=platform
/// E: ID_MODEL=uart
/// "#,
/// )?);
/// let mut devices = context.list_devices();
/// match_many!(devices, subsystem = "platform", ID_MODEL = "uart")?;
/// assert_eq!(devices.scan()?.count(), 1);
/// # Ok(())
/// # }
/// ```
///
/// [`Enumerator::match_many`]: crate::enumerate::Enumerator::match_many
#[macro_export]
macro_rules! match_many {
    ($enumerator:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $enumerator.match_many([
            $((stringify!($key), $crate::value::MatchValue::from($value))),+
        ])
    };
}
