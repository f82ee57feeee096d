#[macro_export]
macro_rules! pdf_enum {
    (
        $(#[$attr:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$doc:meta])*
                $variant:ident = $val:literal
            ),*,
            }
    ) => {
        $(#[$attr])*
        $vis enum $name {
            $(
                $(#[$doc])*
                $variant
            ),*,
        }

        impl $name {
            pub fn from_str(s: &str) -> $crate::RenderResult<Self> {
                Ok(match s {
                    $($val => Self::$variant),*,
                    _ => return Err($crate::RenderError::UnsupportedFeature {
                        feature: format!(concat!(stringify!($name), " {:?}"), s),
                    })
                })
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $val),*,
                }
            }
        }
    };
    (
        int
        $(#[$attr:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$doc:meta])*
                $variant:ident = $val:literal
            ),*,
            }
    ) => {
        $(#[$attr])*
        $vis enum $name {
            $(
                $(#[$doc])*
                $variant = $val
            ),*,
        }

        impl $name {
            pub fn from_integer(s: i32) -> $crate::RenderResult<Self> {
                Ok(match s {
                    $($val => Self::$variant),*,
                    _ => return Err($crate::RenderError::UnsupportedFeature {
                        feature: format!(concat!(stringify!($name), " {}"), s),
                    })
                })
            }
        }
    };
}
