/// Resolve the logical user behind a relay connection.
///
/// An authenticated principal's identity name wins; otherwise the caller-supplied `userId`
/// query parameter is used. Blank values count as absent. `None` means the connection is
/// anonymous and must not be tracked.
#[must_use]
pub fn resolve_user_id(principal: Option<&str>, query_user_id: Option<&str>) -> Option<String> {
    principal
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| query_user_id.map(str::trim).filter(|id| !id.is_empty()))
        .map(str::to_owned)
}
