//! Reading the initial guess.

use std::io::{BufRead, Write};

use nalgebra::DVector;

use crate::errors::InputError;

/// Prompts for `n` components on `writer` and reads one number per line from
/// `reader`.
///
/// Components are labelled `[1, 1]` to `[n, 1]`. Surrounding whitespace is
/// ignored; anything else that does not parse as an `f64` is an error.
///
/// # Errors
/// - [`InputError::Parse`] on the first malformed line
/// - [`InputError::UnexpectedEof`] if the input ends early
/// - [`InputError::Io`] if reading or writing fails
pub fn read_vector<R: BufRead, W: Write>(
    n: usize,
    mut reader: R,
    mut writer: W,
) -> Result<DVector<f64>, InputError> {
    let mut values = Vec::with_capacity(n);
    let mut line = String::new();

    for i in 0..n {
        write!(writer, "Enter element [{}, 1] of initial guess vector: ", i + 1)?;
        writer.flush()?;

        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(InputError::UnexpectedEof {
                read: i,
                expected: n,
            });
        }
        values.push(parse_component(i + 1, &line)?);
    }

    Ok(DVector::from_vec(values))
}

/// Parses a comma separated vector such as `"0, 0, 0"`.
///
/// # Errors
/// - [`InputError::Count`] if there are not exactly `n` components
/// - [`InputError::Parse`] if a component is not a number
pub fn parse_vector(text: &str, n: usize) -> Result<DVector<f64>, InputError> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != n {
        return Err(InputError::Count {
            expected: n,
            got: parts.len(),
        });
    }
    let values = parts
        .iter()
        .enumerate()
        .map(|(i, part)| parse_component(i + 1, part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DVector::from_vec(values))
}

fn parse_component(index: usize, text: &str) -> Result<f64, InputError> {
    let trimmed = text.trim();
    trimmed.parse::<f64>().map_err(|_| InputError::Parse {
        index,
        input: trimmed.to_string(),
    })
}
