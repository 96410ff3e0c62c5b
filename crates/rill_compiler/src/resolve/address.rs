//! Designator resolution: storage kind, byte address and value type.
//!
//! A designator chain resolves front to back. The head segment binds to a
//! local, a parameter or a function call; member segments add the field
//! offset of their parent's record type. Addresses are relative to the
//! storage the head picked, the generator never sees absolute locations.

use crate::model::{builtin, BlockId, DesigId, StorageKind, StmtKind, TypeId};

use super::Resolver;

impl Resolver<'_> {
    pub(crate) fn calc_address(
        &mut self,
        d: DesigId,
        block: BlockId,
        progress: &mut bool,
    ) -> bool {
        if self.program.designator(d).complete {
            return true;
        }
        if let Some(parent) = self.program.designator(d).parent {
            if !self.calc_address(parent, block, progress) {
                return false;
            }
            return self.resolve_member(d, parent, progress);
        }
        if self.program.designator(d).args.is_some() {
            return self.resolve_call(d, progress);
        }

        let name = self.program.designator(d).name.clone();
        match self.lookup_var(&name, block) {
            Some((kind, address, type_id)) => {
                let desig = self.program.desig_mut(d);
                desig.kind = kind;
                desig.address = address;
                desig.type_id = type_id;
                desig.complete = true;
                *progress = true;
                true
            }
            None => false,
        }
    }

    /// A member segment; the parent segment is already resolved.
    fn resolve_member(&mut self, d: DesigId, parent: DesigId, progress: &mut bool) -> bool {
        let name = self.program.designator(d).name.clone();
        let span = self.program.designator(d).span;
        let p = self.program.designator(parent);
        let parent_kind = p.kind;
        let parent_address = p.address;
        let parent_type = p.type_id;

        let Some(ty) = self.program.type_by_id(parent_type) else {
            self.error("value has no members", Some(span));
            self.complete_bad_member(d, parent_kind, progress);
            return true;
        };
        if !ty.complete {
            return false;
        }
        match ty.fields.get(&name) {
            Some(field) => {
                let address = parent_address + field.offset;
                let type_id = field.type_id;
                let desig = self.program.desig_mut(d);
                desig.kind = parent_kind;
                desig.address = address;
                desig.type_id = type_id;
                desig.complete = true;
                *progress = true;
                true
            }
            None => {
                let type_name = ty.name.clone();
                self.error(
                    format!("no member named '{}' on type '{}'", name, type_name),
                    Some(span),
                );
                self.complete_bad_member(d, parent_kind, progress);
                true
            }
        }
    }

    /// A bad member access still completes so resolution does not report
    /// it a second time as a stuck forward reference.
    fn complete_bad_member(&mut self, d: DesigId, kind: StorageKind, progress: &mut bool) {
        let desig = self.program.desig_mut(d);
        desig.kind = kind;
        desig.type_id = builtin::UNKNOWN;
        desig.complete = true;
        *progress = true;
    }

    /// A call segment completes once the callee's return type is known and
    /// every argument expression has completed. Pending callees count as
    /// soon as a return statement has pinned their type, which is what
    /// lets recursive functions resolve.
    fn resolve_call(&mut self, d: DesigId, progress: &mut bool) -> bool {
        let name = self.program.designator(d).name.clone();
        let Some(callee) = self.program.any_function_id_by_name(&name) else {
            return false;
        };

        let args = self.program.designator(d).args.clone().unwrap_or_default();
        let mut all = true;
        for arg in &args {
            if !self.try_complete_expression(*arg, progress) {
                all = false;
            }
        }
        if !all {
            return false;
        }

        let f = self.program.function_ref(callee);
        let return_type = f.return_type;
        let expected = f.params.params.len();
        if return_type == builtin::UNKNOWN {
            return false;
        }
        if args.len() != expected {
            let span = self.program.designator(d).span;
            self.error(
                format!(
                    "function '{}' expects {} arguments, {} given",
                    name,
                    expected,
                    args.len()
                ),
                Some(span),
            );
        }

        let desig = self.program.desig_mut(d);
        desig.callee = Some(callee);
        desig.type_id = return_type;
        desig.complete = true;
        *progress = true;
        true
    }

    /// Check the enclosing function's parameters first, then walk the
    /// lexical chain for a completed declaration.
    fn lookup_var(&self, name: &str, block: BlockId) -> Option<(StorageKind, i32, TypeId)> {
        let function = self.program.block(block).function;
        let f = self.program.function_ref(function);
        if f.params.complete {
            if let Some(p) = f.params.get(name) {
                return Some((StorageKind::Param, p.offset, p.type_id));
            }
        }

        let mut current = Some(block);
        while let Some(id) = current {
            let b = self.program.block(id);
            if let Some(&sid) = b.vars.get(name) {
                if let StmtKind::VarDecl {
                    type_id, offset, ..
                } = self.program.stmt(sid).kind
                {
                    return Some((StorageKind::Local, offset, type_id));
                }
            }
            current = b.parent;
        }
        None
    }
}
