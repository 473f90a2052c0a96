use std::sync::Arc;

use courier::{Args, Status, StatusCode, Value};
use serde_json::json;

/// A bound server method.
pub type MethodFn = Arc<dyn Fn(Args) -> Result<Value, Status> + Send + Sync>;

/// Methods exposed by a [`LoopbackServer`](crate::LoopbackServer), in
/// declaration order.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: Vec<(String, MethodFn)>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `method`, replacing any earlier binding of the same name
    /// in place.
    pub fn bind(
        mut self,
        name: impl Into<String>,
        method: impl Fn(Args) -> Result<Value, Status> + Send + Sync + 'static,
    ) -> Self {
        self.insert(name.into(), Arc::new(method));
        self
    }

    pub(crate) fn insert(&mut self, name: String, method: MethodFn) {
        match self.methods.iter_mut().find(|(bound, _)| *bound == name) {
            Some((_, slot)) => *slot = method,
            None => self.methods.push((name, method)),
        }
    }

    pub fn get(&self, name: &str) -> Option<MethodFn> {
        self.methods
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, method)| method.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.methods.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.names())
            .finish()
    }
}

fn two_integers(args: &Args) -> Result<(i64, i64), Status> {
    match args.positional.as_slice() {
        [a, b] => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(Status::new(
                StatusCode::InvalidArgument,
                format!("expected two integers, got {a} and {b}"),
            )),
        },
        other => Err(Status::new(
            StatusCode::InvalidArgument,
            format!("expected two arguments, got {}", other.len()),
        )),
    }
}

/// `add` and `sub` over two integer arguments.
pub fn arithmetic() -> MethodTable {
    MethodTable::new()
        .bind("add", |args| {
            let (a, b) = two_integers(&args)?;
            Ok(json!(a + b))
        })
        .bind("sub", |args| {
            let (a, b) = two_integers(&args)?;
            Ok(json!(a - b))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn rebinding_keeps_declaration_order() {
        let table = arithmetic()
            .bind("mul", |_| Ok(json!(0)))
            .bind("add", |_| Ok(json!("replaced")));
        assert_eq!(table.names(), vec!["add", "sub", "mul"]);

        let add = table.get("add").unwrap();
        assert_eq!(add(Args::new()).unwrap(), json!("replaced"));
    }

    #[test]
    fn arithmetic_rejects_bad_arguments() {
        let add = arithmetic().get("add").unwrap();
        assert_eq!(add(courier::args![4, 7]).unwrap(), json!(11));

        let err = add(courier::args![4, 7, 9]).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        expect!["expected two arguments, got 3"].assert_eq(err.message());
    }
}
