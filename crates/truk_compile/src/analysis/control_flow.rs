//! Control-flow analysis over function bodies.
//!
//! Two questions, both answered by a short recursive walk:
//!
//! 1. Does a block *guarantee* a `return` on every path? A non-void
//!    function whose body does not is rejected.
//! 2. Does a statement *contain* control flow (`return`, `break`,
//!    `continue`) anywhere? Deferred code must not, since it runs during
//!    scope unwinding.
//!
//! Loops never count toward a guaranteed return: a `while` condition may
//! be false on entry, so nothing inside it is a proof.

use truk_language::ast::{Block, Stmt};

/// `true` if every path through the block reaches a `return`.
pub fn block_guarantees_return(block: &Block) -> bool {
    block.statements.iter().any(stmt_guarantees_return)
}

fn stmt_guarantees_return(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } => true,
        Stmt::Block(block) => block_guarantees_return(block),
        Stmt::If { then_block, else_block, .. } => {
            let else_returns = match else_block.as_deref() {
                Some(stmt) => stmt_guarantees_return(stmt),
                None => false,
            };
            else_returns && block_guarantees_return(then_block)
        }
        Stmt::Match { arms, .. } => {
            // Exhaustive only if an else arm exists and every arm returns.
            arms.iter().any(|a| a.pattern.is_none())
                && arms.iter().all(|a| block_guarantees_return(&a.body))
        }
        _ => false,
    }
}

/// `true` if the statement contains `return`, `break` or `continue`
/// anywhere, including nested blocks and loop bodies.
pub fn contains_control_flow(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => true,
        Stmt::Block(block) => block.statements.iter().any(contains_control_flow),
        Stmt::If { then_block, else_block, .. } => {
            then_block.statements.iter().any(contains_control_flow)
                || else_block
                    .as_deref()
                    .map(contains_control_flow)
                    .unwrap_or(false)
        }
        Stmt::While { body, .. } => body.statements.iter().any(contains_control_flow),
        Stmt::For { init, post, body, .. } => {
            init.as_deref().map(contains_control_flow).unwrap_or(false)
                || post.as_deref().map(contains_control_flow).unwrap_or(false)
                || body.statements.iter().any(contains_control_flow)
        }
        Stmt::Match { arms, .. } => arms
            .iter()
            .any(|a| a.body.statements.iter().any(contains_control_flow)),
        Stmt::Defer { body, .. } => contains_control_flow(body),
        Stmt::Assign { .. }
        | Stmt::Var(_)
        | Stmt::Const(_)
        | Stmt::Let(_)
        | Stmt::Expr(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truk_base::Interner;
    use truk_language::ast::Decl;
    use truk_language::Parser;

    fn body_of(source: &str) -> Block {
        let mut interner = Interner::new();
        let parsed = Parser::new(source, &mut interner).parse().expect("parse");
        match parsed.declarations.into_iter().next().expect("one decl") {
            Decl::Fn(f) => f.body.expect("body"),
            _ => panic!("expected fn"),
        }
    }

    #[test]
    fn direct_return_guarantees() {
        let body = body_of("fn f(): i32 { return 1; }");
        assert!(block_guarantees_return(&body));
    }

    #[test]
    fn empty_body_does_not_guarantee() {
        let body = body_of("fn f(): void { }");
        assert!(!block_guarantees_return(&body));
    }

    #[test]
    fn if_without_else_does_not_guarantee() {
        let body = body_of("fn f(x: i32): i32 { if x > 0 { return 1; } }");
        assert!(!block_guarantees_return(&body));
    }

    #[test]
    fn if_else_with_both_returns_guarantees() {
        let body = body_of(
            "fn f(x: i32): i32 { if x > 0 { return 1; } else { return -1; } }",
        );
        assert!(block_guarantees_return(&body));
    }

    #[test]
    fn else_if_chain_with_final_else_guarantees() {
        let body = body_of(
            "fn f(x: i32): i32 {
                if x > 0 { return 1; }
                else if x < 0 { return -1; }
                else { return 0; }
            }",
        );
        assert!(block_guarantees_return(&body));
    }

    #[test]
    fn while_never_guarantees() {
        let body = body_of("fn f(): i32 { while true { return 1; } }");
        assert!(!block_guarantees_return(&body));
    }

    #[test]
    fn trailing_return_after_loop_guarantees() {
        let body = body_of("fn f(): i32 { while true { break; } return 0; }");
        assert!(block_guarantees_return(&body));
    }

    #[test]
    fn match_with_else_and_all_returns_guarantees() {
        let body = body_of(
            "fn f(x: i32): i32 {
                match x {
                    1 => { return 10; },
                    else => { return 0; }
                }
            }",
        );
        assert!(block_guarantees_return(&body));
    }

    #[test]
    fn match_without_else_does_not_guarantee() {
        let body = body_of(
            "fn f(x: i32): i32 {
                match x { 1 => { return 10; } }
            }",
        );
        assert!(!block_guarantees_return(&body));
    }

    #[test]
    fn defer_body_control_flow_detected() {
        let body = body_of("fn f(): void { defer { return; } }");
        let Stmt::Defer { body: deferred, .. } = &body.statements[0] else {
            panic!("expected defer");
        };
        assert!(contains_control_flow(deferred));
    }

    #[test]
    fn plain_call_has_no_control_flow() {
        let body = body_of("fn f(): void { g(); }");
        assert!(!contains_control_flow(&body.statements[0]));
    }

    #[test]
    fn nested_loop_break_is_detected() {
        let body = body_of("fn f(): void { { while true { break; } } }");
        assert!(contains_control_flow(&body.statements[0]));
    }
}
