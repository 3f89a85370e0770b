use crate::{
    ast::{Ast, Item, Param},
    error::{CinderError, StageContractErrorKind},
    name_resolution::{Stage, SymbolTable},
    types::{builtin, Semantic, StructType, Type, TypeId, TypeTable},
};

/// Validates every pipeline-stage entry point against its fixed contract.
/// Plain functions are not constrained.
pub fn check(ast: &mut Ast, symbols: &SymbolTable, types: &TypeTable) {
    for info in &symbols.functions {
        let stage = match info.stage {
            Some(stage) => stage,
            None => continue,
        };

        let fun = match &ast.items[info.item_index] {
            Item::Fun(fun) => fun,
            _ => continue,
        };

        let entry = ast.rodeo.resolve(&info.name).to_string();
        let mut checker = StageCheck {
            entry,
            stage,
            types,
            ast_errors: vec![],
            rodeo: &ast.rodeo,
        };

        match stage {
            Stage::Vertex => checker.check_vertex(info.ret, &fun.params, &info.params),
            Stage::Fragment => checker.check_fragment(info.ret, &fun.params, &info.params),
            Stage::Compute => checker.check_compute(
                info.ret,
                info.workgroup_size,
                &fun.params,
                &info.params,
            ),
        }

        let decl_span = ast.spans[fun.name.id].clone();
        for kind in checker.ast_errors {
            ast.errors
                .push(CinderError::StageContractError(kind, decl_span.clone()));
        }
    }
}

struct StageCheck<'a> {
    entry: String,
    stage: Stage,
    types: &'a TypeTable,
    ast_errors: Vec<StageContractErrorKind>,
    rodeo: &'a lasso::RodeoReader,
}

impl StageCheck<'_> {
    fn push(&mut self, kind: StageContractErrorKind) {
        self.ast_errors.push(kind);
    }

    /// Free of `self` borrows so error pushing stays available; the result
    /// borrows the type table, which outlives the checker.
    fn as_struct(types: &TypeTable, ty: TypeId) -> Option<&StructType> {
        match types.get(ty) {
            Type::Struct(strukt) => Some(strukt),
            _ => None,
        }
    }

    fn bad_param(&mut self, param: &str) {
        self.push(StageContractErrorKind::BadStageParameter {
            entry: self.entry.clone(),
            param: param.to_string(),
            stage: self.stage.name(),
        });
    }

    fn check_vertex(&mut self, ret: TypeId, params: &[Param], param_types: &[TypeId]) {
        match Self::as_struct(self.types, ret) {
            Some(strukt) => {
                let positions = strukt
                    .members
                    .iter()
                    .filter(|m| m.semantic == Some(Semantic::Position))
                    .count();
                if positions == 0 {
                    self.push(StageContractErrorKind::MissingPosition(self.entry.clone()));
                } else if positions > 1 {
                    self.push(StageContractErrorKind::DuplicatePosition(
                        self.entry.clone(),
                    ));
                }
                for member in &strukt.members {
                    if member.semantic.is_none() {
                        self.push(StageContractErrorKind::MissingSemantic(
                            self.rodeo.resolve(&member.name).to_string(),
                        ));
                    }
                }
            }
            None => self.push(StageContractErrorKind::MissingPosition(self.entry.clone())),
        }

        for (param, ty) in params.iter().zip(param_types) {
            let param_name = self.rodeo.resolve(&param.name.spur).to_string();
            if let Some(strukt) = Self::as_struct(self.types, *ty) {
                for member in &strukt.members {
                    match member.semantic {
                        None => self.push(StageContractErrorKind::MissingSemantic(
                            self.rodeo.resolve(&member.name).to_string(),
                        )),
                        Some(Semantic::Position)
                        | Some(Semantic::Target(_))
                        | Some(Semantic::DispatchThreadId) => {
                            let name = self.rodeo.resolve(&member.name).to_string();
                            self.bad_param(&name);
                        }
                        Some(_) => {}
                    }
                }
            } else {
                // Bare parameters carry their own semantic tag.
                let semantic = param
                    .semantic
                    .and_then(|s| Semantic::parse(self.rodeo.resolve(&s.spur)));
                let ok = match semantic {
                    Some(Semantic::VertexId) | Some(Semantic::InstanceId) => {
                        *ty == builtin::UINT_ID
                    }
                    Some(semantic) => {
                        !matches!(
                            semantic,
                            Semantic::Position | Semantic::Target(_) | Semantic::DispatchThreadId
                        ) && matches!(
                            self.types.get(*ty),
                            Type::Scalar(_) | Type::Vector(_, _)
                        )
                    }
                    None => false,
                };
                if !ok {
                    self.bad_param(&param_name);
                }
            }
        }
    }

    fn check_fragment(&mut self, ret: TypeId, params: &[Param], param_types: &[TypeId]) {
        for (param, ty) in params.iter().zip(param_types) {
            let param_name = self.rodeo.resolve(&param.name.spur).to_string();
            match Self::as_struct(self.types, *ty) {
                Some(strukt) => {
                    for member in &strukt.members {
                        let field = self.rodeo.resolve(&member.name).to_string();
                        match member.semantic {
                            None => {
                                self.push(StageContractErrorKind::MissingSemantic(field))
                            }
                            Some(semantic) if semantic.is_vertex_only() => {
                                self.push(StageContractErrorKind::VertexOnlySemantic {
                                    field,
                                    semantic: semantic.hlsl_name(),
                                });
                            }
                            Some(Semantic::Target(_)) | Some(Semantic::DispatchThreadId) => {
                                self.bad_param(&field)
                            }
                            Some(_) => {}
                        }
                    }
                }
                None => self.bad_param(&param_name),
            }
        }

        let ok = if ret == builtin::FVEC_ID[4] {
            true
        } else {
            match Self::as_struct(self.types, ret) {
                Some(strukt) => {
                    !strukt.members.is_empty()
                        && strukt
                            .members
                            .iter()
                            .all(|m| matches!(m.semantic, Some(Semantic::Target(_))))
                }
                None => false,
            }
        };
        if !ok {
            self.push(StageContractErrorKind::BadFragmentOutput(self.entry.clone()));
        }
    }

    fn check_compute(
        &mut self,
        ret: TypeId,
        workgroup: Option<[u32; 3]>,
        params: &[Param],
        param_types: &[TypeId],
    ) {
        if ret != builtin::VOID_ID && ret != builtin::ERROR_ID {
            self.push(StageContractErrorKind::ComputeReturnsValue(
                self.entry.clone(),
            ));
        }
        if workgroup.is_none() {
            self.push(StageContractErrorKind::MissingThreadGroupSize(
                self.entry.clone(),
            ));
        }

        for (param, ty) in params.iter().zip(param_types) {
            let param_name = self.rodeo.resolve(&param.name.spur).to_string();
            let semantic = param
                .semantic
                .and_then(|s| Semantic::parse(self.rodeo.resolve(&s.spur)));
            let ok = semantic == Some(Semantic::DispatchThreadId)
                && *ty == builtin::UVEC_ID[3];
            if !ok {
                self.bad_param(&param_name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::CinderError, lexer, name_resolution, parser, type_resolution};

    fn check(src: &str) -> crate::ast::Ast {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = name_resolution::visit(&mut ast);
        let _ = type_resolution::visit(&mut ast, &symbols, &types);
        ast
    }

    fn stage_errors(ast: &crate::ast::Ast) -> Vec<String> {
        ast.errors
            .iter()
            .filter(|e| matches!(e, CinderError::StageContractError(_, _)))
            .map(|e| format!("{}", e))
            .collect()
    }

    const VS_OK: &str = "struct VSIn { float3 position : POSITION; }\nstruct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main(VSIn input) { VSOut output; output.position = float4(input.position, 1.0); return output; }";

    #[test]
    fn valid_vertex_entry() {
        let ast = check(VS_OK);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }

    #[test]
    fn vertex_without_position_output() {
        let src = "struct VSOut { float2 uv : TEXCOORD0; }\n#[vertex]\nVSOut vs_main() { VSOut o; o.uv = float2(0.0, 0.0); return o; }";
        let ast = check(src);
        let errors = stage_errors(&ast);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("SV_Position"));
    }

    #[test]
    fn fragment_input_with_vertex_only_semantic() {
        let src = "struct PSIn { float3 normal : NORMAL; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return float4(input.normal, 1.0); }";
        let ast = check(src);
        let errors = stage_errors(&ast);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("NORMAL"));
    }

    #[test]
    fn compute_without_thread_group_size() {
        let src = "#[compute]\nvoid cs_main(uint3 id : SV_DispatchThreadID) { }";
        let ast = check(src);
        let errors = stage_errors(&ast);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("thread-group"));
    }

    #[test]
    fn compute_with_return_value_is_rejected() {
        let src = "#[compute(8, 8, 1)]\nfloat cs_main(uint3 id : SV_DispatchThreadID) { return 1.0; }";
        let ast = check(src);
        assert_eq!(stage_errors(&ast).len(), 1);
    }

    #[test]
    fn fragment_returning_float4_is_fine() {
        let src = "struct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return float4(input.uv, 0.0, 1.0); }";
        let ast = check(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }
}
