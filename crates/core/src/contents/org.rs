use crate::contents::Expansion;
use crate::errwarns::CoreError;
use crate::output::OutputContext;

/// Advance the running offset to a fixed target. An offset-setter: moving
/// the tail start past the target is an error, since already-placed data
/// would overlap it.
#[derive(Debug, Clone)]
pub struct OrgContents {
    target: u64,
    fill: u8,
}

impl OrgContents {
    pub fn new(target: u64, fill: u8) -> Self {
        Self { target, fill }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn tail_at(&self, start: u64) -> Result<u64, CoreError> {
        if self.target < start {
            return Err(CoreError::Value(
                "ORG overlaps with already existing data".into(),
            ));
        }
        Ok(self.target - start)
    }

    pub fn expand(&self, fixed_len: u64, new_offset: i64) -> Result<(u64, Expansion), CoreError> {
        let tail = self.tail_at(new_offset as u64 + fixed_len)?;
        Ok((
            tail,
            Expansion::Dependent {
                neg_thres: i64::MIN,
                pos_thres: i64::MAX,
            },
        ))
    }

    pub fn output(&self, tail_len: u64, ctx: &mut OutputContext<'_>) -> Result<(), CoreError> {
        ctx.write_bytes(&vec![self.fill; tail_len as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_covers_distance_to_target() {
        let org = OrgContents::new(16, 0);
        assert_eq!(org.tail_at(7).expect("tail"), 9);
        assert_eq!(org.tail_at(16).expect("tail"), 0);
    }

    #[test]
    fn moving_backwards_is_an_error() {
        let org = OrgContents::new(16, 0);
        let err = org.tail_at(32).expect_err("overlap");
        assert!(err.to_string().contains("ORG overlaps"));
    }
}
