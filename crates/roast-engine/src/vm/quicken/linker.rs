//! Resolution and linking of quickenable sites
//!
//! Builds the node for a site from its original constant-pool operand.
//! Nothing here is cached on failure: an error leaves the site generic and the
//! next execution resolves again.

use std::sync::Arc;

use crate::bytecode::Opcode;
use crate::vm::class::MethodInfo;
use crate::vm::frame::Frame;
use crate::vm::interpreter::Interpreter;
use crate::vm::quicken::node::{
    ArrayAccessNode, Dispatch, FieldAccessNode, InvokeNode, MiscNode, QuickNode, Site, TypeCheckNode,
};
use crate::vm::runtime::LinkError;
use crate::vm::{VmError, VmResult};

/// Resolve the site and build its node
///
/// `frame` and `top` are only inspected (the receiver of a virtual call seeds
/// the monomorphic cache); nothing is popped.
pub(crate) fn link(
    interp: &Interpreter<'_>,
    site: &Site<'_>,
    opcode: Opcode,
    frame: &Frame,
    top: usize,
) -> VmResult<QuickNode> {
    if opcode.is_slim_quickenable() {
        return Ok(QuickNode::ArrayAccess(ArrayAccessNode::new(opcode)));
    }

    let stream = site.code.stream();
    let at = site.bci as usize;
    let index = stream
        .original_u16(at + 1)
        .ok_or_else(|| VmError::Malformed(format!("truncated {} at bci {}", opcode.name(), site.bci)))?;
    let resolver = site.code.resolver();
    let linked = |r: Result<QuickNode, LinkError>| r.map_err(|e| interp.link_error(e));

    match opcode {
        Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
            linked(resolver.resolve_field(opcode, index).and_then(|field| {
                let wants_static = matches!(opcode, Opcode::Getstatic | Opcode::Putstatic);
                if field.is_static != wants_static {
                    return Err(LinkError::IncompatibleClassChange(format!(
                        "{} used with {} field {}",
                        opcode.name(),
                        if field.is_static { "static" } else { "instance" },
                        field
                    )));
                }
                Ok(QuickNode::FieldAccess(FieldAccessNode { opcode, field }))
            }))
        }
        Opcode::Invokedynamic => linked(resolver.link_call_site(index, site.bci).and_then(|target| {
            if !target.is_static() {
                return Err(LinkError::IncompatibleClassChange(format!(
                    "call site target {} is not static",
                    target
                )));
            }
            Ok(QuickNode::Invoke(InvokeNode {
                opcode,
                resolved: target.clone(),
                dispatch: Dispatch::Direct(target),
            }))
        })),
        Opcode::Invokestatic
        | Opcode::Invokespecial
        | Opcode::Invokevirtual
        | Opcode::Invokeinterface => {
            let resolved = resolver
                .resolve_method(opcode, index)
                .map_err(|e| interp.link_error(e))?;
            link_invoke(interp, site, opcode, resolved, frame, top)
        }
        Opcode::New => linked(
            resolver
                .resolve_type(index)
                .map(|class| QuickNode::Misc(MiscNode::New(class))),
        ),
        Opcode::Anewarray => linked(
            resolver
                .resolve_type(index)
                .map(|class| QuickNode::Misc(MiscNode::ANewArray(class))),
        ),
        Opcode::Multianewarray => {
            let dimensions = stream
                .original_tag(at + 3)
                .ok_or_else(|| VmError::Malformed(format!("truncated multianewarray at bci {}", site.bci)))?;
            if dimensions == 0 {
                return Err(VmError::Malformed(format!(
                    "multianewarray with zero dimensions at bci {}",
                    site.bci
                )));
            }
            linked(resolver.resolve_type(index).map(|class| {
                QuickNode::Misc(MiscNode::MultiANewArray { class, dimensions })
            }))
        }
        Opcode::Checkcast => linked(
            resolver
                .resolve_type(index)
                .map(|class| QuickNode::CheckCast(TypeCheckNode::new(class))),
        ),
        Opcode::Instanceof => linked(
            resolver
                .resolve_type(index)
                .map(|class| QuickNode::InstanceOf(TypeCheckNode::new(class))),
        ),
        other => Err(VmError::Malformed(format!(
            "{} is not quickenable",
            other.name()
        ))),
    }
}

fn link_invoke(
    interp: &Interpreter<'_>,
    site: &Site<'_>,
    opcode: Opcode,
    resolved: Arc<MethodInfo>,
    frame: &Frame,
    top: usize,
) -> VmResult<QuickNode> {
    let incompatible = |what: &str| {
        interp.link_error(LinkError::IncompatibleClassChange(format!(
            "{} of {} method {}",
            opcode.name(),
            what,
            resolved
        )))
    };

    let dispatch = match opcode {
        Opcode::Invokestatic => {
            if !resolved.is_static() {
                return Err(incompatible("instance"));
            }
            Dispatch::Direct(resolved.clone())
        }
        Opcode::Invokespecial => {
            if resolved.is_static() {
                return Err(incompatible("static"));
            }
            Dispatch::Direct(super_call_target(interp, site, &resolved)?)
        }
        _ => {
            if resolved.is_static() {
                return Err(incompatible("static"));
            }
            if resolved.is_effectively_final() {
                Dispatch::Direct(resolved.clone())
            } else {
                let receiver_at = Frame::below(top, resolved.param_slots())?;
                match frame.get_object(receiver_at)? {
                    Some(receiver) => {
                        let rt = interp.runtime();
                        let class = rt.class_of(receiver);
                        let target = rt
                            .select_method(&class, &resolved)
                            .map_err(|e| interp.link_error(e))?;
                        Dispatch::Monomorphic {
                            class: class.id,
                            target,
                        }
                    }
                    // the node raises the NullPointerException
                    None => Dispatch::Virtual,
                }
            }
        }
    };
    Ok(QuickNode::Invoke(InvokeNode {
        opcode,
        resolved,
        dispatch,
    }))
}

/// `invokespecial` target after the super-call rewrite
fn super_call_target(
    interp: &Interpreter<'_>,
    site: &Site<'_>,
    resolved: &Arc<MethodInfo>,
) -> VmResult<Arc<MethodInfo>> {
    let current = &site.method.holder;
    let holder = &resolved.holder;
    let is_super_call = !resolved.is_constructor()
        && !holder.is_interface
        && holder.id != current.id
        && current.is_subclass_of(holder);
    if !is_super_call {
        return Ok(resolved.clone());
    }
    let Some(super_class) = current.super_class.as_ref() else {
        return Ok(resolved.clone());
    };
    interp
        .runtime()
        .lookup_method(super_class, &resolved.name, &resolved.descriptor)
        .ok_or_else(|| {
            interp.link_error(LinkError::NoSuchMethod(format!(
                "{}.{}{}",
                super_class, resolved.name, resolved.descriptor
            )))
        })
}
