use crate::errwarns::CoreError;
use crate::expr::Expr;
use crate::object::Object;
use crate::output::OutputContext;
use crate::value::Value;

/// One element of a data tail: raw bytes, a deferred value, or a float
/// literal of a fixed width.
#[derive(Debug, Clone)]
pub enum DataItem {
    Bytes(Vec<u8>),
    Value(Value),
    Float { value: f64, size: u32 },
}

impl DataItem {
    fn len(&self) -> u64 {
        match self {
            DataItem::Bytes(bytes) => bytes.len() as u64,
            DataItem::Value(value) => value.field_width(),
            DataItem::Float { size, .. } => u64::from(size / 8),
        }
    }
}

/// Integer/string/float data. Item widths are fixed at parse time, so the
/// tail length never depends on a span.
#[derive(Debug, Clone, Default)]
pub struct DataContents {
    items: Vec<DataItem>,
}

impl DataContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[DataItem] {
        &self.items
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.push_bytes(&[byte]);
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        // Merge adjacent raw runs so `db 1,2,3` stays one item.
        if let Some(DataItem::Bytes(run)) = self.items.last_mut() {
            run.extend_from_slice(bytes);
        } else {
            self.items.push(DataItem::Bytes(bytes.to_vec()));
        }
    }

    pub fn push_string(&mut self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    pub fn push_value(&mut self, value: Value) {
        self.items.push(DataItem::Value(value));
    }

    pub fn push_expr(&mut self, size_bits: u32, expr: Expr) {
        self.push_value(Value::from_expr(size_bits, expr));
    }

    pub fn push_float(&mut self, value: f64, size_bits: u32) -> Result<(), CoreError> {
        if size_bits != 32 && size_bits != 64 {
            return Err(CoreError::Type(format!(
                "unsupported float size {size_bits}"
            )));
        }
        self.items.push(DataItem::Float {
            value,
            size: size_bits,
        });
        Ok(())
    }

    pub(crate) fn finalize(&mut self, object: &Object) -> Result<(), CoreError> {
        for item in &mut self.items {
            if let DataItem::Value(value) = item {
                value.finalize(object)?;
            }
        }
        Ok(())
    }

    pub(crate) fn calc_len(&self) -> u64 {
        self.items.iter().map(DataItem::len).sum()
    }

    pub(crate) fn output(
        &self,
        object: &Object,
        ctx: &mut OutputContext<'_>,
    ) -> Result<(), CoreError> {
        for item in &self.items {
            match item {
                DataItem::Bytes(bytes) => ctx.write_bytes(bytes)?,
                DataItem::Value(value) => ctx.write_value(object, value)?,
                DataItem::Float { value, size } => {
                    let bits = match size {
                        32 => u64::from((*value as f32).to_bits()),
                        _ => (*value).to_bits(),
                    };
                    ctx.write_un(bits, *size)?;
                }
            }
        }
        Ok(())
    }
}
