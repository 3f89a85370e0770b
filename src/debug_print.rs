//! A stable, compact dump of the AST used by the driver's `--print` flag
//! and by tests that want to pin parser output.

use crate::ast::{
    Ast, Attr, Attrs, BinOpKind, Expr, ExprVisitor, Field, FunDecl, Id, Item, ItemVisitor,
    LocalVar, Name, Stmt, StmtVisitor, TextureDim, UnOpKind,
};
use lasso::RodeoReader;

pub fn visit(ast: &Ast) -> String {
    let mut printer = DebugPrint {
        rodeo: &ast.rodeo,
        indent: String::from("\n"),
    };

    let items: Vec<String> = ast.items.iter().map(|i| printer.visit_item(i)).collect();
    items.join("\n")
}

struct DebugPrint<'a> {
    rodeo: &'a RodeoReader,
    indent: String,
}

impl DebugPrint<'_> {
    fn ident(&self, name: Name) -> String {
        self.rodeo.resolve(&name.spur).to_string()
    }

    fn field(&self, field: &Field) -> String {
        let array = match field.array {
            Some((_, n)) => format!("[{}]", n),
            None => String::new(),
        };
        let semantic = match field.semantic {
            Some(name) => format!(" : {}", self.ident(name)),
            None => String::new(),
        };
        format!(
            "{} {}{}{}",
            self.ident(field.ty),
            self.ident(field.name),
            array,
            semantic
        )
    }

    fn attrs(&self, attrs: &Attrs) -> String {
        match attrs {
            Attrs::None => String::new(),
            Attrs::Error(_) => "#[<error>] ".to_string(),
            Attrs::Ok(_, list) => {
                let inner: Vec<String> = list
                    .iter()
                    .map(|Attr(name, tokens)| {
                        let tokens: Vec<String> =
                            tokens.iter().map(|(_, t)| format!("{}", t)).collect();
                        format!("{}{}", self.ident(*name), tokens.join(""))
                    })
                    .collect();
                format!("#[{}] ", inner.join(", "))
            }
        }
    }
}

impl ItemVisitor for DebugPrint<'_> {
    type Out = String;

    fn structure(&mut self, _struct_id: Id, name: Name, fields: &[Field]) -> Self::Out {
        let fields: Vec<String> = fields.iter().map(|f| format!("\t{};", self.field(f))).collect();
        format!("struct {} {{\n{}\n}}", self.ident(name), fields.join("\n"))
    }

    fn cbuffer(&mut self, _cbuffer_id: Id, attrs: &Attrs, name: Name, fields: &[Field]) -> Self::Out {
        let fields: Vec<String> = fields.iter().map(|f| format!("\t{};", self.field(f))).collect();
        format!(
            "{}cbuffer {} {{\n{}\n}}",
            self.attrs(attrs),
            self.ident(name),
            fields.join("\n")
        )
    }

    fn texture(&mut self, _decl_id: Id, attrs: &Attrs, dim: TextureDim, name: Name) -> Self::Out {
        let ty = match dim {
            TextureDim::Two => "Texture2D",
            TextureDim::Three => "Texture3D",
            TextureDim::Cube => "TextureCube",
        };
        format!("{}{} {};", self.attrs(attrs), ty, self.ident(name))
    }

    fn sampler(&mut self, _decl_id: Id, attrs: &Attrs, name: Name) -> Self::Out {
        format!("{}SamplerState {};", self.attrs(attrs), self.ident(name))
    }

    fn fun(&mut self, fun: &FunDecl) -> Self::Out {
        let params: Vec<String> = fun
            .params
            .iter()
            .map(|p| {
                let semantic = match p.semantic {
                    Some(name) => format!(" : {}", self.ident(name)),
                    None => String::new(),
                };
                format!("{} {}{}", self.ident(p.ty), self.ident(p.name), semantic)
            })
            .collect();
        let ret = match fun.ret {
            Some(name) => self.ident(name),
            None => "void".to_string(),
        };
        format!(
            "{}{} {}({}) {}",
            self.attrs(&fun.attrs),
            ret,
            self.ident(fun.name),
            params.join(", "),
            self.visit_stmt(&fun.body)
        )
    }

    fn item_error(&mut self, _id: Id) -> Self::Out {
        "<item error>".to_string()
    }
}

impl StmtVisitor for DebugPrint<'_> {
    type Out = String;

    fn block(&mut self, _id: Id, stmts: &[Stmt]) -> Self::Out {
        self.indent.push('\t');
        let indent = self.indent.clone();
        let body: Vec<String> = stmts.iter().map(|s| self.visit_stmt(s)).collect();
        self.indent.pop();

        if body.is_empty() {
            "{}".to_string()
        } else {
            format!("{{{}{}{}}}", indent, body.join(&indent), self.indent)
        }
    }

    fn local_var(&mut self, var: &LocalVar) -> Self::Out {
        let array = match var.array {
            Some((_, n)) => format!("[{}]", n),
            None => String::new(),
        };
        match &var.init {
            Some(init) => format!(
                "(let {} {}{} = {})",
                self.ident(var.ty),
                self.ident(var.name),
                array,
                self.visit_expr(init)
            ),
            None => format!(
                "(let {} {}{})",
                self.ident(var.ty),
                self.ident(var.name),
                array
            ),
        }
    }

    fn assign(&mut self, _eq_id: Id, op: Option<BinOpKind>, lhs: &Expr, rhs: &Expr) -> Self::Out {
        let op = match op {
            Some(op) => format!("{}=", op.symbol()),
            None => "=".to_string(),
        };
        format!("({} {} {})", self.visit_expr(lhs), op, self.visit_expr(rhs))
    }

    fn if_stmt(
        &mut self,
        _if_id: Id,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<(Id, &Stmt)>,
    ) -> Self::Out {
        let mut text = format!("if {} {}", self.visit_expr(cond), self.visit_stmt(then_branch));
        if let Some((_, stmt)) = else_branch {
            text.push_str(&format!(" else {}", self.visit_stmt(stmt)));
        }
        text
    }

    fn for_stmt(
        &mut self,
        _for_id: Id,
        init: &Stmt,
        cond: &Expr,
        step: &Stmt,
        body: &Stmt,
    ) -> Self::Out {
        format!(
            "for [{}; {}; {}] {}",
            self.visit_stmt(init),
            self.visit_expr(cond),
            self.visit_stmt(step),
            self.visit_stmt(body)
        )
    }

    fn ret(&mut self, _id: Id, expr: Option<&Expr>) -> Self::Out {
        match expr {
            Some(expr) => format!("(return {})", self.visit_expr(expr)),
            None => "(return)".to_string(),
        }
    }

    fn expr_stmt(&mut self, expr: &Expr) -> Self::Out {
        self.visit_expr(expr)
    }

    fn stmt_error(&mut self, _id: Id) -> Self::Out {
        "<stmt error>".to_string()
    }
}

impl ExprVisitor for DebugPrint<'_> {
    type Out = String;

    fn binary(&mut self, _id: Id, kind: BinOpKind, left: &Expr, right: &Expr) -> Self::Out {
        format!(
            "({} {} {})",
            self.visit_expr(left),
            kind.symbol(),
            self.visit_expr(right)
        )
    }

    fn unary(&mut self, _id: Id, kind: UnOpKind, operand: &Expr) -> Self::Out {
        format!("({}{})", kind.symbol(), self.visit_expr(operand))
    }

    fn int(&mut self, _id: Id, i: i32) -> Self::Out {
        format!("#{}", i)
    }

    fn float(&mut self, _id: Id, f: f32) -> Self::Out {
        format!("#{}", f)
    }

    fn boolean(&mut self, _id: Id, b: bool) -> Self::Out {
        format!("#{}", b)
    }

    fn identifier(&mut self, name: Name) -> Self::Out {
        format!("${}", self.ident(name))
    }

    fn call(&mut self, _id: Id, name: Name, args: &[Expr]) -> Self::Out {
        let args: Vec<String> = args.iter().map(|a| self.visit_expr(a)).collect();
        format!("{}({})", self.ident(name), args.join(", "))
    }

    fn member(&mut self, _id: Id, expr: &Expr, member: Name) -> Self::Out {
        format!("{}.{}", self.visit_expr(expr), self.ident(member))
    }

    fn index(&mut self, _id: Id, expr: &Expr, index: &Expr) -> Self::Out {
        format!("{}[{}]", self.visit_expr(expr), self.visit_expr(index))
    }

    fn expr_error(&mut self, _id: Id) -> Self::Out {
        "<expr error>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::{lexer, parser};

    #[test]
    fn prints_a_small_function() {
        let ast = parser::parse(lexer::lex("float add(float a, float b) { return a + b; }"));
        insta::assert_snapshot!(super::visit(&ast), @r###"
        float add(float a, float b) {
        	(return ($a + $b))
        }
        "###);
    }

    #[test]
    fn prints_stage_attribute_and_struct() {
        let ast = parser::parse(lexer::lex(
            "struct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main() { VSOut o; return o; }",
        ));
        let text = super::visit(&ast);
        assert!(text.contains("struct VSOut {"));
        assert!(text.contains("float4 position : SV_Position;"));
        assert!(text.contains("#[vertex] VSOut vs_main() {"));
    }
}
