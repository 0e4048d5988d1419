//! Lowering from syntax tree to operations
//!
//! Besides building the operation tree, lowering performs the static
//! checks: every variable reference must name something declared earlier
//! in the code or already present in the scope being compiled against,
//! and every command word is classified as a special form, a function
//! variable, or an external command.

use std::collections::HashSet;
use std::sync::Arc;

use super::ast::{Chunk, Compound, Form, FormItem, Indexed, Lambda, Pipeline, Primary, Span};
use super::lexer::RedirMode;
use crate::environment::{split_qualified, FN_SUFFIX, NS_SUFFIX};
use crate::error::EvalError;
use crate::eval::{
    ChunkOp, DelOp, Expr, FnBody, FnOp, ForOp, FormOp, Head, IfOp, LValue, LambdaDef, Logic,
    LogicOp, PipelineOp, RedirOp, RedirTarget, SetOp, TryOp, UseOp, VarOp, WhileOp,
};
use crate::frontend::{CallSite, CompileError, CompileScope, Operation, Source};
use crate::modules::binding_name;
use crate::value::Value;

/// Names handled by the compiler rather than looked up as commands.
pub const SPECIAL_FORMS: &[&str] = &[
    "var", "set", "del", "fn", "use", "if", "while", "for", "try", "and", "or",
];

/// Prefix forcing a command word to name an external program.
const EXTERNAL_PREFIX: &str = "e:";

type Result<T> = std::result::Result<T, EvalError>;

/// What a literal command word refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandName {
    /// The function variable with this name (`name~`, `ns:name~`)
    Fn(String),
    /// An external program
    External(String),
    /// A qualified name whose namespace is not in scope
    Unbound(String),
}

/// Classify a command word that is not a special form.
///
/// `has` says whether a variable is in scope. Qualified names always
/// refer to a function variable; plain names fall back to an external
/// program when no `name~` is visible.
pub(crate) fn command_name(name: &str, has: impl Fn(&str) -> bool) -> CommandName {
    if let Some(program) = name.strip_prefix(EXTERNAL_PREFIX) {
        return CommandName::External(program.to_string());
    }
    let var = format!("{}{}", name, FN_SUFFIX);
    if let Some((ns, _)) = split_qualified(name) {
        return if has(ns) {
            CommandName::Fn(var)
        } else {
            CommandName::Unbound(var)
        };
    }
    if has(&var) {
        CommandName::Fn(var)
    } else {
        CommandName::External(name.to_string())
    }
}

/// Lower a parsed chunk to run in `outer`.
pub(crate) fn lower(
    source: &Arc<Source>,
    chunk: &Chunk,
    outer: CompileScope<'_>,
) -> Result<Arc<dyn Operation>> {
    let mut lowering = Lowering {
        source: source.clone(),
        outer,
        scopes: vec![HashSet::new()],
    };
    lowering.chunk(chunk)
}

struct Lowering<'a> {
    source: Arc<Source>,
    outer: CompileScope<'a>,
    /// Names declared by the code so far, innermost lambda last
    scopes: Vec<HashSet<String>>,
}

impl Lowering<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Scope tracking
    // ═══════════════════════════════════════════════════════════════════

    fn has(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name)) || self.outer.has(name)
    }

    fn declare(&mut self, name: impl Into<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into());
        }
    }

    fn check_var(&self, name: &str, span: &Span) -> Result<()> {
        let visible = match split_qualified(name) {
            Some((ns, _)) => self.has(ns),
            None => self.has(name),
        };
        if visible {
            Ok(())
        } else {
            Err(self.error(span, format!("variable ${} not found", name)))
        }
    }

    fn error(&self, span: &Span, message: impl Into<String>) -> EvalError {
        CompileError::new(message)
            .with_location(self.source.location(span.start))
            .into()
    }

    fn site(&self, span: &Span) -> CallSite {
        CallSite::new(self.source.clone(), span.clone())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Chunks, pipelines, forms
    // ═══════════════════════════════════════════════════════════════════

    fn chunk(&mut self, chunk: &Chunk) -> Result<Arc<dyn Operation>> {
        let mut pipelines = Vec::with_capacity(chunk.pipelines.len());
        for pipeline in &chunk.pipelines {
            pipelines.push(self.pipeline(pipeline)?);
        }
        Ok(Arc::new(ChunkOp { pipelines }))
    }

    fn pipeline(&mut self, pipeline: &Pipeline) -> Result<Arc<dyn Operation>> {
        if let [form] = pipeline.forms.as_slice() {
            return self.form(form);
        }
        let mut stages = Vec::with_capacity(pipeline.forms.len());
        for form in &pipeline.forms {
            stages.push(self.form(form)?);
        }
        Ok(Arc::new(PipelineOp {
            site: self.site(&pipeline.span),
            stages,
        }))
    }

    fn form(&mut self, form: &Form) -> Result<Arc<dyn Operation>> {
        if let Some(name) = form.head.as_bareword() {
            if SPECIAL_FORMS.contains(&name) {
                if let Some(redir) = form.redirs.first() {
                    return Err(self.error(&redir.span, format!("{} does not take redirections", name)));
                }
                return self.special(name, form);
            }
        }

        let head = self.head(&form.head)?;
        let mut args = Vec::new();
        let mut opts = Vec::new();
        for item in &form.items {
            match item {
                FormItem::Arg(word) => args.push(self.compound(word)?),
                FormItem::Opt(opt) => {
                    let value = match &opt.value {
                        Some(word) => Some(self.compound(word)?),
                        None => None,
                    };
                    opts.push((opt.name.clone(), value));
                }
                FormItem::Eq(_) => args.push(Expr::Literal(Value::from("="))),
            }
        }

        let mut redirs = Vec::with_capacity(form.redirs.len());
        for redir in &form.redirs {
            let target = match redir.mode {
                RedirMode::Dup(src) => RedirTarget::Dup(src),
                RedirMode::Write | RedirMode::Append => {
                    let word = redir
                        .target
                        .as_ref()
                        .ok_or_else(|| self.error(&redir.span, "redirection needs a target"))?;
                    RedirTarget::File {
                        path: self.compound(word)?,
                        append: redir.mode == RedirMode::Append,
                    }
                }
            };
            redirs.push(RedirOp {
                fd: redir.fd,
                target,
            });
        }

        Ok(Arc::new(FormOp {
            site: self.site(&form.span),
            head,
            args,
            opts,
            redirs,
        }))
    }

    /// Classify the command word.
    fn head(&mut self, word: &Compound) -> Result<Head> {
        let Some(name) = word.as_literal() else {
            return Ok(Head::Expr(self.compound(word)?));
        };
        match command_name(name, |var| self.has(var)) {
            CommandName::Fn(var) => Ok(Head::Fn(var)),
            CommandName::External(program) => Ok(Head::External(program)),
            CommandName::Unbound(var) => {
                Err(self.error(&word.span, format!("variable ${} not found", var)))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Words
    // ═══════════════════════════════════════════════════════════════════

    fn compound(&mut self, word: &Compound) -> Result<Expr> {
        let mut parts = Vec::with_capacity(word.parts.len());
        for part in &word.parts {
            parts.push(self.indexed(part)?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(Expr::Compound(parts))
        }
    }

    fn indexed(&mut self, indexed: &Indexed) -> Result<Expr> {
        let head = self.primary(&indexed.head, &indexed.span)?;
        if indexed.indices.is_empty() {
            return Ok(head);
        }
        let mut indices = Vec::with_capacity(indexed.indices.len());
        for index in &indexed.indices {
            let mut keys = Vec::with_capacity(index.len());
            for key in index {
                keys.push(self.compound(key)?);
            }
            indices.push(keys);
        }
        Ok(Expr::Indexed {
            head: Box::new(head),
            indices,
        })
    }

    fn primary(&mut self, primary: &Primary, span: &Span) -> Result<Expr> {
        match primary {
            Primary::Bareword(s) | Primary::Quoted(s) => Ok(Expr::Literal(Value::from(s.as_str()))),
            Primary::Variable { name, explode } => {
                self.check_var(name, span)?;
                Ok(Expr::Variable {
                    name: name.clone(),
                    explode: *explode,
                })
            }
            Primary::Capture(chunk) => Ok(Expr::Capture(self.chunk(chunk)?)),
            Primary::List(items) => {
                let mut exprs = Vec::with_capacity(items.len());
                for item in items {
                    exprs.push(self.compound(item)?);
                }
                Ok(Expr::List(exprs))
            }
            Primary::Map(pairs) => {
                let mut exprs = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    exprs.push((self.compound(k)?, self.compound(v)?));
                }
                Ok(Expr::Map(exprs))
            }
            Primary::Lambda(lambda) => Ok(Expr::Lambda(self.lambda(lambda, false)?)),
        }
    }

    /// Compile a lambda; `fn_body` makes `return` stop at it.
    fn lambda(&mut self, lambda: &Lambda, fn_body: bool) -> Result<Arc<LambdaDef>> {
        // Defaults are evaluated where the lambda is created.
        let mut options = Vec::with_capacity(lambda.options.len());
        for (name, default) in &lambda.options {
            options.push((name.clone(), self.compound(default)?));
        }

        let mut rest = None;
        let mut params = Vec::with_capacity(lambda.params.len());
        for (i, param) in lambda.params.iter().enumerate() {
            if param.rest {
                if rest.is_some() {
                    return Err(self.error(&lambda.span, "only one rest parameter is allowed"));
                }
                rest = Some(i);
            }
            params.push(param.name.clone());
        }

        let mut scope: HashSet<String> = params.iter().cloned().collect();
        scope.extend(options.iter().map(|(name, _)| name.clone()));
        scope.extend(lambda.rest_options.iter().cloned());
        self.scopes.push(scope);
        let body = self.chunk(&lambda.body);
        self.scopes.pop();
        let mut body = body?;
        if fn_body {
            body = Arc::new(FnBody { body });
        }

        Ok(Arc::new(LambdaDef {
            params,
            rest,
            options,
            rest_options: lambda.rest_options.clone(),
            body,
            source: self.source.clone(),
        }))
    }

    /// A body word, which must be a literal lambda.
    fn body(&mut self, word: &Compound) -> Result<Expr> {
        match word.as_lambda() {
            Some(lambda) => Ok(Expr::Lambda(self.lambda(lambda, false)?)),
            None => Err(self.error(&word.span, "expected a lambda")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Special forms
    // ═══════════════════════════════════════════════════════════════════

    fn special(&mut self, name: &str, form: &Form) -> Result<Arc<dyn Operation>> {
        let site = self.site(&form.span);
        match name {
            "var" => self.var_form(site, form),
            "set" => self.set_form(site, form),
            "del" => self.del_form(form),
            "fn" => self.fn_form(site, form),
            "use" => self.use_form(site, form),
            "if" => self.if_form(site, form),
            "while" => self.while_form(site, form),
            "for" => self.for_form(site, form),
            "try" => self.try_form(site, form),
            "and" => self.logic_form(site, form, Logic::And),
            "or" => self.logic_form(site, form, Logic::Or),
            other => Err(self.error(&form.span, format!("unknown special form {}", other))),
        }
    }

    /// Positional words of a special form; options and `=` are errors.
    fn words<'f>(&self, form: &'f Form, items: &'f [FormItem]) -> Result<Vec<&'f Compound>> {
        let head = form.head.as_bareword().unwrap_or_default();
        items
            .iter()
            .map(|item| match item {
                FormItem::Arg(word) => Ok(word),
                FormItem::Opt(opt) => {
                    Err(self.error(&opt.span, format!("{} does not take options", head)))
                }
                FormItem::Eq(span) => Err(self.error(span, format!("unexpected = in {}", head))),
            })
            .collect()
    }

    /// Split items at the first `=`.
    fn split_eq<'f>(form: &'f Form) -> (&'f [FormItem], Option<&'f [FormItem]>) {
        match form
            .items
            .iter()
            .position(|item| matches!(item, FormItem::Eq(_)))
        {
            Some(i) => (&form.items[..i], Some(&form.items[i + 1..])),
            None => (&form.items[..], None),
        }
    }

    fn exprs(&mut self, words: &[&Compound]) -> Result<Vec<Expr>> {
        let mut exprs = Vec::with_capacity(words.len());
        for word in words {
            exprs.push(self.compound(word)?);
        }
        Ok(exprs)
    }

    /// Target names, with the position of the `@rest` one.
    fn targets<'f>(&self, words: &[&'f Compound]) -> Result<(Vec<(&'f str, &'f Compound)>, Option<usize>)> {
        let mut rest = None;
        let mut names = Vec::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            let name = match word.parts.as_slice() {
                [Indexed {
                    head: Primary::Bareword(name),
                    ..
                }] => name.as_str(),
                _ => return Err(self.error(&word.span, "expected a variable name")),
            };
            let name = match name.strip_prefix('@') {
                Some(stripped) => {
                    if rest.is_some() {
                        return Err(self.error(&word.span, "at most one rest variable is allowed"));
                    }
                    rest = Some(i);
                    stripped
                }
                None => name,
            };
            if name.is_empty() {
                return Err(self.error(&word.span, "empty variable name"));
            }
            names.push((name, *word));
        }
        Ok((names, rest))
    }

    fn var_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let (lhs, rhs) = Self::split_eq(form);
        let lhs = self.words(form, lhs)?;
        if lhs.is_empty() {
            return Err(self.error(&form.span, "var needs at least one variable"));
        }
        let (names, rest) = self.targets(&lhs)?;
        for (_, word) in &names {
            if !word.parts[0].indices.is_empty() {
                return Err(self.error(&word.span, "variable declarations cannot be indexed"));
            }
        }
        let values = match rhs {
            Some(rhs) => {
                let rhs = self.words(form, rhs)?;
                Some(self.exprs(&rhs)?)
            }
            None => None,
        };
        let targets: Vec<Option<String>> = names
            .iter()
            .map(|(name, _)| (*name != "_").then(|| name.to_string()))
            .collect();
        for name in targets.iter().flatten() {
            self.declare(name.clone());
        }
        Ok(Arc::new(VarOp {
            site,
            targets,
            rest,
            values,
        }))
    }

    fn lvalue(&mut self, name: &str, word: &Compound) -> Result<LValue> {
        self.check_var(name, &word.span)?;
        let mut indices = Vec::new();
        for index in &word.parts[0].indices {
            match index.as_slice() {
                [key] => indices.push(self.compound(key)?),
                _ => return Err(self.error(&word.span, "an assignment index takes exactly one key")),
            }
        }
        Ok(LValue {
            name: name.to_string(),
            indices,
        })
    }

    fn set_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let (lhs, rhs) = Self::split_eq(form);
        let Some(rhs) = rhs else {
            return Err(self.error(&form.span, "set needs ="));
        };
        let lhs = self.words(form, lhs)?;
        if lhs.is_empty() {
            return Err(self.error(&form.span, "set needs at least one variable"));
        }
        let rhs = self.words(form, rhs)?;
        let values = self.exprs(&rhs)?;
        let (names, rest) = self.targets(&lhs)?;
        let mut targets = Vec::with_capacity(names.len());
        for (name, word) in names {
            targets.push(self.lvalue(name, word)?);
        }
        Ok(Arc::new(SetOp {
            site,
            targets,
            rest,
            values,
        }))
    }

    fn del_form(&mut self, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let (names, rest) = self.targets(&words)?;
        if rest.is_some() {
            return Err(self.error(&form.span, "del does not take rest variables"));
        }
        let mut ops: Vec<Arc<dyn Operation>> = Vec::with_capacity(names.len());
        for (name, word) in names {
            let target = self.lvalue(name, word)?;
            if target.indices.is_empty() {
                let local = self.scopes.len() == 1 && self.outer.local.contains(name);
                let declared = self.scopes.last_mut().is_some_and(|s| s.remove(name));
                if !local && !declared {
                    return Err(self.error(
                        &word.span,
                        format!("only variables in the local scope can be deleted: ${}", name),
                    ));
                }
            }
            ops.push(Arc::new(DelOp {
                site: self.site(&word.span),
                target,
            }));
        }
        Ok(Arc::new(ChunkOp { pipelines: ops }))
    }

    fn fn_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let [name, body] = words.as_slice() else {
            return Err(self.error(&form.span, "usage: fn name { body }"));
        };
        let Some(name) = name.as_bareword() else {
            return Err(self.error(&name.span, "expected a function name"));
        };
        let Some(lambda) = body.as_lambda() else {
            return Err(self.error(&body.span, "expected a lambda"));
        };
        let var = format!("{}{}", name, FN_SUFFIX);
        self.declare(var.clone());
        let lambda = self.lambda(lambda, true)?;
        Ok(Arc::new(FnOp { site, var, lambda }))
    }

    fn use_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let (spec, alias) = match words.as_slice() {
            [spec] => (*spec, None),
            [spec, alias] => (*spec, Some(*alias)),
            _ => return Err(self.error(&form.span, "usage: use spec [alias]")),
        };
        let Some(spec) = spec.as_literal() else {
            return Err(self.error(&spec.span, "module spec must be a literal string"));
        };
        let name = match alias {
            Some(word) => word
                .as_bareword()
                .ok_or_else(|| self.error(&word.span, "expected a module alias"))?,
            None => binding_name(spec),
        };
        let var = format!("{}{}", name, NS_SUFFIX);
        self.declare(var.clone());
        Ok(Arc::new(UseOp {
            site,
            spec: spec.to_string(),
            var,
        }))
    }

    fn if_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let mut rest = words.as_slice();
        let mut branches = Vec::new();
        let mut else_body = None;
        loop {
            let [cond, body, tail @ ..] = rest else {
                return Err(self.error(&form.span, "usage: if cond { } (elif cond { })* (else { })?"));
            };
            branches.push((self.compound(cond)?, self.body(body)?));
            match tail {
                [] => break,
                [kw, tail @ ..] if kw.as_bareword() == Some("elif") => rest = tail,
                [kw, body] if kw.as_bareword() == Some("else") => {
                    else_body = Some(self.body(body)?);
                    break;
                }
                [kw, ..] => return Err(self.error(&kw.span, "expected elif or else")),
            }
        }
        Ok(Arc::new(IfOp {
            site,
            branches,
            else_body,
        }))
    }

    fn else_clause(&mut self, tail: &[&Compound]) -> Result<Option<Expr>> {
        match tail {
            [] => Ok(None),
            [kw, body] if kw.as_bareword() == Some("else") => Ok(Some(self.body(body)?)),
            [kw, ..] => Err(self.error(&kw.span, "expected else")),
        }
    }

    fn while_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let [cond, body, tail @ ..] = words.as_slice() else {
            return Err(self.error(&form.span, "usage: while cond { } (else { })?"));
        };
        let cond = self.compound(cond)?;
        let body = self.body(body)?;
        let else_body = self.else_clause(tail)?;
        Ok(Arc::new(WhileOp {
            site,
            cond,
            body,
            else_body,
        }))
    }

    fn for_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let [var, iterable, body, tail @ ..] = words.as_slice() else {
            return Err(self.error(&form.span, "usage: for var $iterable { } (else { })?"));
        };
        let Some(var) = var.as_bareword() else {
            return Err(self.error(&var.span, "expected a variable name"));
        };
        let iterable = self.compound(iterable)?;
        self.declare(var);
        let body = self.body(body)?;
        let else_body = self.else_clause(tail)?;
        Ok(Arc::new(ForOp {
            site,
            var: var.to_string(),
            iterable,
            body,
            else_body,
        }))
    }

    fn try_form(&mut self, site: CallSite, form: &Form) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let [body, tail @ ..] = words.as_slice() else {
            return Err(self.error(&form.span, "usage: try { } (catch e { })? (else { })? (finally { })?"));
        };
        let body = self.body(body)?;
        let mut rest = tail;

        let mut catch = None;
        if let [kw, tail @ ..] = rest {
            if kw.as_bareword() == Some("catch") {
                let (var, catch_body, tail) = match tail {
                    [body, tail @ ..] if body.as_lambda().is_some() => (None, *body, tail),
                    [var, body, tail @ ..] => {
                        let name = var
                            .as_bareword()
                            .ok_or_else(|| self.error(&var.span, "expected a variable name"))?;
                        (Some(name.to_string()), *body, tail)
                    }
                    _ => return Err(self.error(&kw.span, "catch needs a body")),
                };
                if let Some(var) = &var {
                    self.declare(var.clone());
                }
                catch = Some((var, self.body(catch_body)?));
                rest = tail;
            }
        }

        let mut else_body = None;
        if let [kw, body, tail @ ..] = rest {
            if kw.as_bareword() == Some("else") {
                else_body = Some(self.body(body)?);
                rest = tail;
            }
        }

        let mut finally = None;
        if let [kw, body, tail @ ..] = rest {
            if kw.as_bareword() == Some("finally") {
                finally = Some(self.body(body)?);
                rest = tail;
            }
        }

        if let Some(word) = rest.first() {
            return Err(self.error(&word.span, "unexpected word in try"));
        }
        Ok(Arc::new(TryOp {
            site,
            body,
            catch,
            else_body,
            finally,
        }))
    }

    fn logic_form(&mut self, site: CallSite, form: &Form, kind: Logic) -> Result<Arc<dyn Operation>> {
        let words = self.words(form, &form.items)?;
        let args = self.exprs(&words)?;
        Ok(Arc::new(LogicOp { site, kind, args }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name() {
        let has = |var: &str| matches!(var, "f~" | "m:");
        assert_eq!(command_name("f", has), CommandName::Fn("f~".into()));
        assert_eq!(command_name("g", has), CommandName::External("g".into()));
        assert_eq!(command_name("e:f", has), CommandName::External("f".into()));
        assert_eq!(command_name("m:g", has), CommandName::Fn("m:g~".into()));
        assert_eq!(command_name("n:g", has), CommandName::Unbound("n:g~".into()));
    }
}
