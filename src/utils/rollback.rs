/// A stack of undo actions over a target of type `T`.
///
/// Each successful construction step pushes the action that reverts it. If a
/// later step fails, [`Rollback::unwind`] runs the recorded actions in
/// reverse order, so exactly the completed steps are undone.
pub(crate) struct Rollback<'a, T> {
    steps: Vec<Box<dyn FnOnce(&mut T) + 'a>>,
}

impl<'a, T> Rollback<'a, T> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Record the action reverting the step just completed.
    pub fn push(&mut self, undo: impl FnOnce(&mut T) + 'a) {
        self.steps.push(Box::new(undo));
    }

    /// Revert every recorded step, latest first.
    pub fn unwind(self, target: &mut T) {
        for undo in self.steps.into_iter().rev() {
            undo(target);
        }
    }
}

/// Run `body` against `target`, reverting its recorded steps if it fails.
pub(crate) fn transaction<'a, T, R, E>(
    target: &mut T,
    body: impl FnOnce(&mut T, &mut Rollback<'a, T>) -> Result<R, E>,
) -> Result<R, E> {
    let mut rollback = Rollback::new();
    match body(target, &mut rollback) {
        Ok(ret) => Ok(ret),
        Err(err) => {
            rollback.unwind(target);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_keeps_steps() {
        let mut log = Vec::new();
        let ret: Result<(), ()> = transaction(&mut log, |log, rb| {
            log.push(1);
            rb.push(|log: &mut Vec<i32>| log.push(-1));
            Ok(())
        });
        assert!(ret.is_ok());
        assert_eq!(log, vec![1]);
    }

    #[test]
    fn failure_unwinds_in_reverse() {
        let mut log = Vec::new();
        let ret: Result<(), &str> = transaction(&mut log, |log, rb| {
            log.push(1);
            rb.push(|log: &mut Vec<i32>| log.push(-1));
            log.push(2);
            rb.push(|log: &mut Vec<i32>| log.push(-2));
            Err("step 3 failed")
        });
        assert_eq!(ret, Err("step 3 failed"));
        assert_eq!(log, vec![1, 2, -2, -1]);
    }
}
