use crate::fixtures::{self, PROBE};
use color_eyre::Result;
use mixweave_core::codec::{JsonCodec, UnitCodec, read_unit};
use mixweave_core::literal::{Literal, PushForm};
use mixweave_core::types::MethodType;
use mixweave_core::{Error, Instruction};

#[tokio::test]
async fn unit_files_decode_to_the_encoded_unit() -> Result<()> {
    crate::init_tracing();
    let unit = fixtures::probe();
    let codec = JsonCodec { pretty: true };
    let path = std::env::temp_dir().join(format!("mixweave-probe-{}.json", std::process::id()));
    tokio::fs::write(&path, codec.encode(&unit)?).await?;

    let decoded = read_unit(&path, &codec)?;
    tokio::fs::remove_file(&path).await?;
    assert_eq!(decoded, unit);
    assert_eq!(decoded.name, PROBE);
    assert!(decoded.field("static").is_some_and(|f| f.is_static));
    Ok(())
}

#[test]
fn pooled_and_immediate_pushes_stay_distinct() -> Result<()> {
    let mut unit = fixtures::counter();
    let desc = MethodType::parse("()I")?;
    unit.procedures.push(fixtures::procedure(
        fixtures::COUNTER,
        "limits",
        "()I",
        true,
        "BIPUSH 7\nLDC int 7\nIADD\nIRETURN",
    ));
    let codec = JsonCodec::default();
    let decoded = codec.decode(&codec.encode(&unit)?)?;

    let limits = decoded
        .procedure("limits", &desc)
        .ok_or_else(|| color_eyre::eyre::eyre!("limits was lost"))?;
    let forms: Vec<_> = limits
        .body
        .instructions()
        .filter_map(|(_, insn)| match insn {
            Instruction::Push(c) if c.literal == Literal::Int(7) => Some(c.form),
            _ => None,
        })
        .collect();
    assert_eq!(forms, vec![PushForm::Byte, PushForm::Pooled]);
    Ok(())
}

#[test]
fn missing_files_report_their_path() {
    let err = read_unit(
        std::path::Path::new("/nonexistent/mixweave/unit.json"),
        &JsonCodec::default(),
    )
    .unwrap_err();
    assert!(matches!(&err, Error::FileRead { path, .. } if path.ends_with("unit.json")));
}

#[test]
fn malformed_json_is_a_codec_error() {
    let err = JsonCodec::default().decode(b"{\"name\": 3}").unwrap_err();
    assert!(matches!(err, Error::Codec(_)));
}
