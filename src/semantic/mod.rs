//! Semantic Analyzer for Rx
//!
//! Runs four passes over one shared scope tree:
//! symbol collection, constant evaluation, struct/trait checking and type
//! checking. Each pass aborts on the first violated rule.

pub mod builtins;
pub mod collector;
pub mod const_eval;
pub mod const_value;
pub mod dump;
pub mod error;
pub mod scope;
pub mod struct_checker;
pub mod symbol;
pub mod type_checker;
pub mod types;
pub mod visit;

pub use collector::SymbolCollector;
pub use const_eval::ConstEvaluator;
pub use const_value::ConstValue;
pub use error::SemanticError;
pub use scope::{Scope, ScopeId, ScopeKind, ScopeTree};
pub use struct_checker::StructChecker;
pub use type_checker::TypeChecker;
pub use types::Ty;

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::error::RxResult;
use crate::parser::ast::{Crate, NodeId};

/// Analysis passes, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pass {
    Collect,
    ConstEval,
    StructCheck,
    TypeCheck,
}

impl Pass {
    pub const ALL: [Pass; 4] = [Pass::Collect, Pass::ConstEval, Pass::StructCheck, Pass::TypeCheck];

    pub fn name(&self) -> &'static str {
        match self {
            Pass::Collect => "collect",
            Pass::ConstEval => "const-eval",
            Pass::StructCheck => "struct-check",
            Pass::TypeCheck => "type-check",
        }
    }

    pub fn from_name(name: &str) -> Option<Pass> {
        Pass::ALL.into_iter().find(|pass| pass.name() == name)
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Pre-register `print`, `exit`, `String::from` and friends
    pub register_builtins: bool,
    /// Last pass to run
    pub stop_after: Pass,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            register_builtins: true,
            stop_after: Pass::TypeCheck,
        }
    }
}

/// Semantic analyzer
pub struct SemanticAnalyzer {
    options: AnalyzerOptions,
    scopes: ScopeTree,
    node_types: HashMap<NodeId, Ty>,
    exit_calls: usize,
    completed: Vec<Pass>,
}

impl SemanticAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self {
            options,
            scopes: ScopeTree::new(),
            node_types: HashMap::new(),
            exit_calls: 0,
            completed: Vec::new(),
        }
    }

    /// Analyze a crate. The scope tree is kept after failure, reflecting every pass that ran.
    pub fn analyze(&mut self, krate: &Crate) -> RxResult<()> {
        self.scopes = ScopeTree::new();
        self.node_types.clear();
        self.exit_calls = 0;
        self.completed.clear();

        for pass in Pass::ALL {
            if pass > self.options.stop_after {
                break;
            }
            debug!("pass {}: start", pass);
            self.run(pass, krate)?;
            self.completed.push(pass);
            debug!("pass {}: ok ({} scopes)", pass, self.scopes.len());
        }
        Ok(())
    }

    fn run(&mut self, pass: Pass, krate: &Crate) -> RxResult<()> {
        match pass {
            Pass::Collect => {
                SymbolCollector::new(&mut self.scopes).collect(krate)?;
                if self.options.register_builtins {
                    builtins::register(&mut self.scopes);
                }
            }
            Pass::ConstEval => ConstEvaluator::new(&mut self.scopes).evaluate(krate)?,
            Pass::StructCheck => StructChecker::new(&mut self.scopes).check(krate)?,
            Pass::TypeCheck => {
                let (node_types, exit_calls) = TypeChecker::new(&mut self.scopes).check(krate)?;
                self.node_types = node_types;
                self.exit_calls = exit_calls;
            }
        }
        Ok(())
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    /// Types recorded for blocks and loops
    pub fn node_types(&self) -> &HashMap<NodeId, Ty> {
        &self.node_types
    }

    pub fn exit_calls(&self) -> usize {
        self.exit_calls
    }

    pub fn completed_passes(&self) -> &[Pass] {
        &self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use indoc::indoc;

    fn parse(source: &str) -> Crate {
        let tokens = Lexer::new(source, "test.rx").tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn analyze(source: &str) -> RxResult<SemanticAnalyzer> {
        let mut analyzer = SemanticAnalyzer::new(AnalyzerOptions::default());
        analyzer.analyze(&parse(source))?;
        Ok(analyzer)
    }

    #[test]
    fn test_end_to_end_program() {
        let analyzer = analyze(indoc! {"
            struct P { x: i32, y: i32 }
            fn make() -> P { P { x: 1, y: 2 } }
            fn main() { let p: P = make(); exit(0); }
        "})
        .unwrap();

        let tree = analyzer.scopes();
        let main_scope = tree.get(ScopeId::ROOT).children[1];
        let body = tree.get(main_scope).children[0];
        assert_eq!(tree.get(body).variables["p"].ty, Ty::named("P"));
        assert_eq!(analyzer.exit_calls(), 1);
        assert_eq!(analyzer.completed_passes(), &Pass::ALL);
    }

    #[test]
    fn test_loop_with_conflicting_breaks() {
        let ok = analyze("fn main() { let x: i32 = loop { break 5; }; exit(0); }");
        assert!(ok.is_ok());

        let err = analyze("fn main() { let x = loop { break 5; break true; }; exit(0); }")
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_partial_trait_impl_rejected() {
        let err = analyze(indoc! {"
            trait Animal {
                fn name(&self) -> i32;
                fn legs(&self) -> i32;
            }
            struct Dog { age: i32 }
            impl Animal for Dog {
                fn name(&self) -> i32 { 1 }
            }
        "})
        .err()
        .unwrap();
        assert_eq!(err.kind, ErrorKind::Arity);
    }

    #[test]
    fn test_field_assignment_needs_mut_binding() {
        let program = |binding: &str| {
            format!(
                "struct S {{ f: i32 }} fn main() {{ let {} = S {{ f: 0 }}; x.f = 1; exit(0); }}",
                binding
            )
        };
        let err = analyze(&program("x")).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Mutability);
        assert!(analyze(&program("mut x")).is_ok());
    }

    #[test]
    fn test_const_evaluation_idempotent() {
        let krate = parse("const A: i32 = 3; const B: bool = true; const C: char = 'z';");
        let mut tree = ScopeTree::new();
        SymbolCollector::new(&mut tree).collect(&krate).unwrap();

        ConstEvaluator::new(&mut tree).evaluate(&krate).unwrap();
        let once = tree.get(ScopeId::ROOT).consts.clone();
        ConstEvaluator::new(&mut tree).evaluate(&krate).unwrap();

        assert_eq!(tree.get(ScopeId::ROOT).consts, once);
        assert_eq!(once["A"].value, Some(ConstValue::Int(3)));
    }

    #[test]
    fn test_nested_program_stays_in_sync() {
        let analyzer = analyze(indoc! {"
            const LEN: usize = 4;

            trait Stack {
                fn push(&mut self, v: i32);
                fn top(&self) -> i32;
            }

            struct Buf { data: [i32; LEN], size: usize }

            impl Stack for Buf {
                fn push(&mut self, v: i32) {
                    if self.size < LEN {
                        self.data[self.size] = v;
                        self.size += 1;
                    }
                }
                fn top(&self) -> i32 {
                    if self.size == 0 { return 0; }
                    self.data[self.size - 1]
                }
            }

            impl Buf {
                fn new() -> Self { Buf { data: [0; LEN], size: 0 } }
            }

            fn sum(b: &Buf) -> i32 {
                let mut total = 0;
                let mut i: usize = 0;
                while i < b.size {
                    {
                        const STEP: usize = 1;
                        total += b.data[i];
                        i += STEP;
                    }
                }
                total
            }

            fn main() {
                let mut b = Buf::new();
                let mut n = 0;
                let last = loop {
                    n += 1;
                    if n > 3 { break n; }
                    b.push(n);
                };
                fn helper(x: i32) -> i32 { x * 2 }
                printlnInt(helper(sum(&b)) + last + b.top());
                exit(0);
            }
        "})
        .unwrap();

        assert!(analyzer.node_types().len() > 10);
        assert!(analyzer.node_types().values().any(|ty| *ty == Ty::i32()));
    }

    #[test]
    fn test_stop_after_skips_later_passes() {
        let mut analyzer = SemanticAnalyzer::new(AnalyzerOptions {
            stop_after: Pass::StructCheck,
            ..AnalyzerOptions::default()
        });
        // A type error only the last pass would find
        analyzer
            .analyze(&parse("fn main() { let x: bool = 1; exit(0); }"))
            .unwrap();
        assert_eq!(
            analyzer.completed_passes(),
            &[Pass::Collect, Pass::ConstEval, Pass::StructCheck]
        );
        assert!(analyzer.node_types().is_empty());
    }

    #[test]
    fn test_pass_names() {
        for pass in Pass::ALL {
            assert_eq!(Pass::from_name(pass.name()), Some(pass));
        }
        assert_eq!(Pass::from_name("link"), None);
    }
}
