/// Convert a free-form deployment or function name into warehouse identifier form.
///
/// Uppercases the input and replaces every hyphen with an underscore. The result is
/// stable under repeated application.
pub fn normalize(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}
