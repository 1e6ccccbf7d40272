//! Abstract Syntax Tree for SPARQL queries
//!
//! Variables are stored without their `?`/`$` sigil. Blank nodes written in a
//! WHERE clause are turned into variables named `_:label` by the parser; such
//! names can never be written by a user and are excluded from `SELECT *`.

use crate::rdf::RdfTerm;

/// Complete SPARQL query representation
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Query form (SELECT, ASK, CONSTRUCT)
    pub form: QueryForm,
    /// WHERE clause
    pub pattern: GroupPattern,
    /// ORDER BY / LIMIT / OFFSET
    pub modifiers: SolutionModifiers,
    /// Trailing VALUES block (optional)
    pub values: Option<ValuesBlock>,
}

/// Query forms
#[derive(Debug, Clone, PartialEq)]
pub enum QueryForm {
    /// SELECT query
    Select {
        /// DISTINCT / REDUCED
        modifier: SelectModifier,
        /// Projection list
        projection: Projection,
    },
    /// ASK query
    Ask,
    /// CONSTRUCT query
    Construct {
        /// Triples instantiated once per solution
        template: Vec<PatternTriple>,
    },
}

/// Duplicate handling for SELECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectModifier {
    #[default]
    None,
    Distinct,
    /// Treated like DISTINCT
    Reduced,
}

/// SELECT projection
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// SELECT *
    All,
    /// Explicit list of variables and `(expr AS ?var)` items
    Items(Vec<SelectItem>),
}

/// One projected column
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// Plain variable: ?x
    Variable(String),
    /// Computed column: (expr AS ?x)
    Expression {
        expression: Expression,
        variable: String,
    },
}

impl SelectItem {
    /// Name of the output column
    pub fn variable(&self) -> &str {
        match self {
            SelectItem::Variable(name) => name,
            SelectItem::Expression { variable, .. } => variable,
        }
    }
}

/// Solution modifiers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolutionModifiers {
    /// ORDER BY conditions
    pub order_by: Vec<OrderCondition>,
    /// LIMIT (optional)
    pub limit: Option<usize>,
    /// OFFSET (0 when absent)
    pub offset: usize,
}

/// Order by item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition {
    /// Expression to order by
    pub expression: Expression,
    /// Order direction
    pub ascending: bool,
}

/// A `{ ... }` group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupPattern {
    pub elements: Vec<PatternElement>,
}

impl GroupPattern {
    pub fn new(elements: Vec<PatternElement>) -> Self {
        Self { elements }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Element of a group graph pattern
#[derive(Debug, Clone, PartialEq)]
pub enum PatternElement {
    /// Basic graph pattern
    Triples(Vec<PatternTriple>),
    /// FILTER, applies to the whole enclosing group
    Filter(Expression),
    /// OPTIONAL { ... }
    Optional(GroupPattern),
    /// { ... } UNION { ... } (two or more branches)
    Union(Vec<GroupPattern>),
    /// Nested { ... }
    Group(GroupPattern),
    /// MINUS { ... }
    Minus(GroupPattern),
    /// BIND(expr AS ?var)
    Bind {
        expression: Expression,
        variable: String,
    },
    /// Inline VALUES
    Values(ValuesBlock),
}

/// Triple pattern with variables
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternTriple {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl PatternTriple {
    pub fn new(subject: TermPattern, predicate: TermPattern, object: TermPattern) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Positions in subject, predicate, object order
    pub fn positions(&self) -> [&TermPattern; 3] {
        [&self.subject, &self.predicate, &self.object]
    }
}

/// One position of a triple pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermPattern {
    /// Variable reference
    Variable(String),
    /// Concrete RDF term
    Term(RdfTerm),
    /// Blank node in a CONSTRUCT template, fresh for every solution
    BlankNode(String),
}

impl TermPattern {
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            TermPattern::Variable(name) => Some(name),
            _ => None,
        }
    }
}

/// VALUES data
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesBlock {
    pub variables: Vec<String>,
    /// One entry per variable; `None` is UNDEF
    pub rows: Vec<Vec<Option<RdfTerm>>>,
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Variable reference
    Variable(String),
    /// Constant IRI or literal
    Constant(RdfTerm),
    /// Binary operation
    Binary {
        /// Left operand
        left: Box<Expression>,
        /// Binary operator
        op: BinaryOp,
        /// Right operand
        right: Box<Expression>,
    },
    /// Unary operation
    Unary {
        /// Unary operator
        op: UnaryOp,
        /// Operand expression
        expr: Box<Expression>,
    },
    /// Built-in function call
    Function {
        /// Function
        function: Function,
        /// Function arguments
        args: Vec<Expression>,
    },
    /// expr IN (...) / expr NOT IN (...)
    In {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    /// EXISTS { ... } / NOT EXISTS { ... }
    Exists {
        pattern: GroupPattern,
        negated: bool,
    },
}

impl Expression {
    pub fn binary(left: Expression, op: BinaryOp, right: Expression) -> Self {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expression) -> Self {
        Expression::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    /// Visit every variable referenced outside of EXISTS patterns
    pub fn visit_variables<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Expression::Variable(name) => f(name),
            Expression::Constant(_) | Expression::Exists { .. } => {}
            Expression::Binary { left, right, .. } => {
                left.visit_variables(f);
                right.visit_variables(f);
            }
            Expression::Unary { expr, .. } => expr.visit_variables(f),
            Expression::Function { args, .. } => {
                for arg in args {
                    arg.visit_variables(f);
                }
            }
            Expression::In { expr, list, .. } => {
                expr.visit_variables(f);
                for item in list {
                    item.visit_variables(f);
                }
            }
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Logical OR (||)
    Or,
    /// Logical AND (&&)
    And,
    /// Equal to (=)
    Eq,
    /// Not equal to (!=)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal to (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal to (>=)
    Ge,
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical NOT (!)
    Not,
    /// Numeric identity (+)
    Plus,
    /// Numeric negation (-)
    Minus,
}

/// Supported built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Bound,
    SameTerm,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    Regex,
    Contains,
    StrStarts,
    StrEnds,
    StrLen,
    UCase,
    LCase,
    Concat,
    If,
    Coalesce,
    Abs,
    /// XSD constructor function, e.g. xsd:integer(?x)
    Cast(CastTarget),
}

/// Target datatype of a cast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    String,
    Integer,
    Decimal,
    Double,
    Boolean,
}

impl Function {
    /// Look up a built-in by its case-insensitive SPARQL name
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_uppercase().as_str() {
            "STR" => Function::Str,
            "LANG" => Function::Lang,
            "LANGMATCHES" => Function::LangMatches,
            "DATATYPE" => Function::Datatype,
            "BOUND" => Function::Bound,
            "SAMETERM" => Function::SameTerm,
            "ISIRI" | "ISURI" => Function::IsIri,
            "ISBLANK" => Function::IsBlank,
            "ISLITERAL" => Function::IsLiteral,
            "ISNUMERIC" => Function::IsNumeric,
            "REGEX" => Function::Regex,
            "CONTAINS" => Function::Contains,
            "STRSTARTS" => Function::StrStarts,
            "STRENDS" => Function::StrEnds,
            "STRLEN" => Function::StrLen,
            "UCASE" => Function::UCase,
            "LCASE" => Function::LCase,
            "CONCAT" => Function::Concat,
            "IF" => Function::If,
            "COALESCE" => Function::Coalesce,
            "ABS" => Function::Abs,
            _ => return None,
        };
        Some(function)
    }

    /// Accepted argument counts, `None` meaning unbounded
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Concat | Function::Coalesce => (0, None),
            Function::Regex => (2, Some(3)),
            Function::If => (3, Some(3)),
            Function::LangMatches
            | Function::SameTerm
            | Function::Contains
            | Function::StrStarts
            | Function::StrEnds => (2, Some(2)),
            _ => (1, Some(1)),
        }
    }
}

impl Query {
    /// Output columns of a SELECT query, in declaration order
    ///
    /// For `SELECT *` these are the variables of the WHERE clause in order of
    /// first appearance.
    pub fn projected_variables(&self) -> Vec<String> {
        match &self.form {
            QueryForm::Select {
                projection: Projection::Items(items),
                ..
            } => items.iter().map(|item| item.variable().to_string()).collect(),
            _ => {
                let mut names = Vec::new();
                collect_group_variables(&self.pattern, &mut names);
                if let Some(values) = &self.values {
                    for name in &values.variables {
                        push_unique(&mut names, name);
                    }
                }
                names.retain(|name| !is_anonymous(name));
                names
            }
        }
    }

    /// Whether this is a SELECT query
    pub fn is_select(&self) -> bool {
        matches!(self.form, QueryForm::Select { .. })
    }
}

/// Variables introduced by a parser-generated blank node
pub fn is_anonymous(name: &str) -> bool {
    name.starts_with("_:")
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Variables that a group can bind, in order of first appearance
pub fn collect_group_variables(group: &GroupPattern, names: &mut Vec<String>) {
    for element in &group.elements {
        match element {
            PatternElement::Triples(triples) => {
                for triple in triples {
                    for position in triple.positions() {
                        if let Some(name) = position.as_variable() {
                            push_unique(names, name);
                        }
                    }
                }
            }
            PatternElement::Optional(inner) | PatternElement::Group(inner) => {
                collect_group_variables(inner, names)
            }
            PatternElement::Union(branches) => {
                for branch in branches {
                    collect_group_variables(branch, names);
                }
            }
            PatternElement::Bind { variable, .. } => push_unique(names, variable),
            PatternElement::Values(values) => {
                for name in &values.variables {
                    push_unique(names, name);
                }
            }
            // MINUS and FILTER never bind
            PatternElement::Minus(_) | PatternElement::Filter(_) => {}
        }
    }
}
