use obelisk_num::{Bytes, IntNum};

use crate::bytecode::BcId;
use crate::errwarns::{CoreError, Errwarns, WarnKind};
use crate::object::Object;
use crate::section::Reloc;
use crate::value::Value;

/// Where emitted bytes go. Object-format writers implement this; the core
/// drives it section by section once the optimizer has settled lengths.
pub trait BytecodeSink {
    fn bytes(&mut self, bytes: &[u8]) -> Result<(), CoreError>;
    fn gap(&mut self, size: u64) -> Result<(), CoreError>;
}

/// Collects output into a flat image; gaps become zero fill. Handy for
/// raw-binary writers and tests.
#[derive(Debug, Default)]
pub struct VecSink {
    pub data: Vec<u8>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BytecodeSink for VecSink {
    fn bytes(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn gap(&mut self, size: u64) -> Result<(), CoreError> {
        self.data.resize(self.data.len() + size as usize, 0);
        Ok(())
    }
}

/// State threaded through tail output: the sink, the running
/// section-relative position, and the relocations recorded so far.
pub struct OutputContext<'a> {
    sink: &'a mut dyn BytecodeSink,
    pub line: u64,
    pub pos: u64,
    pub big_endian: bool,
    relocs: Vec<Reloc>,
    truncations: Vec<u64>,
}

impl<'a> OutputContext<'a> {
    fn new(sink: &'a mut dyn BytecodeSink, line: u64, pos: u64, big_endian: bool) -> Self {
        Self {
            sink,
            line,
            pos,
            big_endian,
            relocs: Vec::new(),
            truncations: Vec::new(),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        self.sink.bytes(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    pub fn write_gap(&mut self, size: u64) -> Result<(), CoreError> {
        self.sink.gap(size)?;
        self.pos += size;
        Ok(())
    }

    pub fn write_un(&mut self, value: u64, bits: u32) -> Result<(), CoreError> {
        let mut field = Bytes::new(self.big_endian);
        field.write_un(value, bits)?;
        self.write_bytes(field.as_slice())
    }

    /// Record a relocation against the field about to be written at the
    /// current position.
    pub fn add_reloc(&mut self, sym: crate::symbol::SymbolRef) {
        self.relocs.push(Reloc {
            addr: self.pos,
            sym,
        });
    }

    /// Resolve and write a deferred value as its own field. The relative
    /// portion becomes a relocation; the absolute portion is written
    /// (shifted) into the field bytes.
    pub fn write_value(&mut self, object: &Object, value: &Value) -> Result<(), CoreError> {
        let site = self.pos;
        let resolved = value.get_intnum(object, true).ok_or_else(|| {
            CoreError::NotConstant("value cannot be resolved to a constant".into())
        })?;
        let resolved = if value.ip_rel {
            IntNum::from_i128(resolved.as_i128() - i128::from(site))
        } else {
            resolved
        };

        if let Some(rel) = value.rel {
            self.add_reloc(rel);
        }

        let width = value.field_width() as usize;
        let mut field = Bytes::new(self.big_endian);
        field.resize(width, 0);
        let truncated = field.overwrite(
            0,
            resolved,
            value.size,
            value.shift as i32,
            self.big_endian,
            value.size_check(),
        )?;
        if truncated.is_some() {
            self.truncations.push(self.line);
        }
        self.write_bytes(field.as_slice())
    }
}

/// Emit every section of the object through `sink`.
pub fn output_object(
    object: &mut Object,
    sink: &mut dyn BytecodeSink,
    errwarns: &mut Errwarns,
) -> Result<(), CoreError> {
    for section in 0..object.sections().len() as u32 {
        output_section(object, section, &mut *sink, errwarns)?;
    }
    Ok(())
}

/// Emit one section: apply fixups into the fixed bytes, stream fixed data
/// and tails, and record relocations on the section. Reserve-only
/// sections degrade to gaps; initialized content there is dropped with a
/// warning.
pub fn output_section(
    object: &mut Object,
    section: u32,
    sink: &mut dyn BytecodeSink,
    errwarns: &mut Errwarns,
) -> Result<(), CoreError> {
    let bss = object.section(section).is_bss();
    let count = object.section(section).bytecodes().len() as u32;
    let mut relocs = Vec::new();

    for pos in 0..count {
        let id = BcId { section, pos };
        let line = object.bytecode(id).line();

        if bss {
            let bc = object.bytecode(id);
            let initialized = !bc.fixed().is_empty()
                || bc.contents().is_some_and(|contents| contents.is_initialized());
            if initialized {
                errwarns.warn(
                    line,
                    WarnKind::UninitContents,
                    "initialized space declared in reserve section: ignoring",
                );
            }
            sink.gap(object.bytecode(id).total_len())?;
            continue;
        }

        if let Err(err) = apply_fixups(object, id, &mut relocs, errwarns) {
            if err.is_fatal() {
                return Err(err);
            }
            errwarns.propagate(line, err);
        }

        {
            let bc = object.bytecode(id);
            if !bc.fixed().is_empty() {
                sink.bytes(bc.fixed())?;
            }
        }

        // Tail output; the contents is taken out so it can look up the
        // object (its own slot is never consulted).
        let contents = object.bytecode_mut(id).contents.take();
        if let Some(tail) = &contents {
            let tail_offset = object.bytecode(id).tail_offset();
            let big_endian = object.section(section).big_endian();
            let mut ctx = OutputContext::new(&mut *sink, line, tail_offset, big_endian);
            let result = tail.output(object, id, &mut ctx);
            relocs.extend(ctx.relocs.drain(..));
            for truncated_line in ctx.truncations.drain(..) {
                errwarns.warn(
                    truncated_line,
                    WarnKind::SizeOverflow,
                    "value does not fit in its field: truncated",
                );
            }
            if let Err(err) = result {
                if err.is_fatal() {
                    object.bytecode_mut(id).contents = contents;
                    return Err(err);
                }
                errwarns.propagate(line, err);
            }
        }
        object.bytecode_mut(id).contents = contents;
    }

    object.section_mut(section).add_relocs(relocs);
    Ok(())
}

/// Patch each fixup's absolute portion into the fixed bytes and record
/// the relative portion as a relocation. Overwrites clear before setting,
/// so re-running output produces identical bytes.
fn apply_fixups(
    object: &mut Object,
    id: BcId,
    relocs: &mut Vec<Reloc>,
    errwarns: &mut Errwarns,
) -> Result<(), CoreError> {
    let line = object.bytecode(id).line();
    let offset = object.bytecode(id).offset();
    let big_endian = object.section(id.section).big_endian();
    let fixup_count = object.bytecode(id).fixups().len();

    for index in 0..fixup_count {
        let (off, value) = {
            let fixup = &object.bytecode(id).fixups()[index];
            (fixup.off(), fixup.value().clone())
        };
        let site = offset + u64::from(off);

        let resolved = value.get_intnum(object, true).ok_or_else(|| {
            CoreError::NotConstant("fixup value cannot be resolved to a constant".into())
        })?;
        let resolved = if value.ip_rel {
            IntNum::from_i128(resolved.as_i128() - i128::from(site))
        } else {
            resolved
        };

        if let Some(rel) = value.rel {
            relocs.push(Reloc { addr: site, sym: rel });
        }

        let truncated = object.bytecode_mut(id).fixed_mut().overwrite(
            off as usize,
            resolved,
            value.size,
            value.shift as i32,
            big_endian,
            value.size_check(),
        )?;
        if truncated.is_some() {
            errwarns.warn(
                line,
                WarnKind::SizeOverflow,
                "value does not fit in its field: truncated",
            );
        }
    }
    Ok(())
}
