use crate::{Error, Result};

// Permission triplets plus setuid, setgid and sticky.
const MODE_BITS: u32 = 0o7777;

/// Which class a symbolic clause targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Who {
    User,
    Group,
    Other,
    All,
}

impl Who {
    // Bit offset of the class's rwx triplet.
    fn shifts(self) -> &'static [u32] {
        match self {
            Who::User => &[6],
            Who::Group => &[3],
            Who::Other => &[0],
            Who::All => &[6, 3, 0],
        }
    }
}

/// A parsed `chmod` mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// Three octal digits, set exactly
    Absolute(u32),
    /// One `{u|g|o|}{+|-}{r|w|x}` clause
    Symbolic { who: Who, add: bool, perm: u32 },
}

impl ModeChange {
    pub fn parse(spec: &str) -> Result<Self> {
        let bad = || Error::syntax(format!("invalid mode: {}", spec));

        if spec.len() == 3 && spec.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            let mode = u32::from_str_radix(spec, 8).map_err(|_| bad())?;
            return Ok(ModeChange::Absolute(mode));
        }

        let bytes = spec.as_bytes();
        let (who, rest) = match bytes.first() {
            Some(b'u') => (Who::User, &bytes[1..]),
            Some(b'g') => (Who::Group, &bytes[1..]),
            Some(b'o') => (Who::Other, &bytes[1..]),
            _ => (Who::All, bytes),
        };
        let (add, perm) = match rest {
            &[op, perm] => {
                let add = match op {
                    b'+' => true,
                    b'-' => false,
                    _ => return Err(bad()),
                };
                let perm = match perm {
                    b'r' => 0o4,
                    b'w' => 0o2,
                    b'x' => 0o1,
                    _ => return Err(bad()),
                };
                (add, perm)
            }
            _ => return Err(bad()),
        };

        Ok(ModeChange::Symbolic { who, add, perm })
    }

    /// New mode computed from `current`.
    ///
    /// The octal form replaces every mode bit, special bits included; only
    /// the file-type bits survive. A symbolic clause touches just its mask.
    pub fn apply(self, current: u32) -> u32 {
        match self {
            ModeChange::Absolute(mode) => (current & !MODE_BITS) | mode,
            ModeChange::Symbolic { who, add, perm } => {
                let mask = who.shifts().iter().fold(0, |acc, shift| acc | (perm << shift));
                if add {
                    current | mask
                } else {
                    current & !mask
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_octal() {
        assert_eq!(ModeChange::parse("644").unwrap(), ModeChange::Absolute(0o644));
        assert_eq!(ModeChange::parse("000").unwrap(), ModeChange::Absolute(0));
        assert!(ModeChange::parse("648").is_err());
        assert!(ModeChange::parse("0644").is_err());
        assert!(ModeChange::parse("64").is_err());
    }

    #[test]
    fn test_parse_symbolic() {
        assert_eq!(
            ModeChange::parse("u-x").unwrap(),
            ModeChange::Symbolic { who: Who::User, add: false, perm: 0o1 }
        );
        assert_eq!(
            ModeChange::parse("+w").unwrap(),
            ModeChange::Symbolic { who: Who::All, add: true, perm: 0o2 }
        );
        for bad in ["u+rw", "a+x", "u=r", "g+", "", "u+x,g+x", "ux"] {
            let err = ModeChange::parse(bad).unwrap_err();
            assert!(err.is_syntax(), "{} should be a syntax error", bad);
        }
    }

    #[test]
    fn test_apply() {
        assert_eq!(ModeChange::parse("u-x").unwrap().apply(0o755), 0o655);
        assert_eq!(ModeChange::parse("g+w").unwrap().apply(0o755), 0o775);
        assert_eq!(ModeChange::parse("o-r").unwrap().apply(0o644), 0o640);
        assert_eq!(ModeChange::parse("-x").unwrap().apply(0o755), 0o644);
        assert_eq!(ModeChange::parse("+r").unwrap().apply(0o000), 0o444);
        assert_eq!(ModeChange::parse("644").unwrap().apply(0o100755), 0o100644);
    }

    #[test]
    fn test_octal_clears_special_bits() {
        let octal = ModeChange::parse("644").unwrap();
        assert_eq!(octal.apply(0o104755), 0o100644);
        assert_eq!(octal.apply(0o041777), 0o040644);
        // Symbolic clauses leave them alone.
        assert_eq!(ModeChange::parse("o-x").unwrap().apply(0o104755), 0o104754);
    }
}
