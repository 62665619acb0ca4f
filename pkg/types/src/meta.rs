/// Identity shared by every namespaced resource.
pub trait Resource {
    fn namespace(&self) -> &str;
    fn name(&self) -> &str;

    /// Store key in the form `namespace/name`.
    fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }
}

/// Implements [`Resource`] for a type with `namespace` and `name` fields.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty) => {
        impl $crate::meta::Resource for $ty {
            fn namespace(&self) -> &str {
                &self.namespace
            }
            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}
