use ndjson_ingest::{
    EnvelopeDecoder, IngestConfig, LineAssembler, LineDecoder, LineErrorKind, LineIngestor, Record,
    RecordId,
};

#[test]
fn assembler_emits_exact_lines_across_feeds() {
    let mut assembler = LineAssembler::new();
    let mut lines = assembler.feed("a\nb\n");
    lines.extend(assembler.feed("c\nd\n"));
    assert_eq!(lines, vec!["a", "b", "c", "d"]);
}

#[test]
fn decoder_follows_envelope_contract() {
    let mut decoder = EnvelopeDecoder::new();

    let alice = decoder
        .decode(r#"{"result":{"id":1,"name":"Alice"}}"#)
        .unwrap()
        .unwrap();
    assert_eq!(alice, Record::new(1, "Alice"));

    let bob = decoder.decode(r#"{"id":2,"name":"Bob"}"#).unwrap().unwrap();
    assert_eq!(bob.id, RecordId::Int(2));
    assert_eq!(bob.name, "Bob");

    let err = decoder.decode("not json").unwrap_err();
    assert_eq!(err.kind, LineErrorKind::MalformedJson);

    let err = decoder.decode(r#"{"id":3}"#).unwrap_err();
    assert_eq!(err.kind, LineErrorKind::IncompleteRecord);
}

#[test]
fn chunk_boundaries_do_not_change_the_outcome() {
    let body = concat!(
        "{\"result\":{\"id\":1,\"name\":\"Zoë\"}}\n",
        "garbage\n",
        "\n",
        "{\"result\":{\"id\":2,\"name\":\"Bob\"}}\n",
    )
    .as_bytes();

    let whole = {
        let mut ingest = LineIngestor::new(EnvelopeDecoder::new(), IngestConfig::default());
        ingest.push_bytes(body)
    };

    for size in [1, 3, 7, 16] {
        let mut ingest = LineIngestor::new(EnvelopeDecoder::new(), IngestConfig::default());
        let mut out = Vec::new();
        for chunk in body.chunks(size) {
            out.extend(ingest.push_bytes(chunk));
        }
        assert!(ingest.finish().is_none());
        assert_eq!(out, whole, "chunk size {size}");
    }

    let names: Vec<_> = whole
        .iter()
        .filter_map(|rec| rec.outcome.as_ref().ok())
        .map(|record| record.name.as_str())
        .collect();
    assert_eq!(names, vec!["Zoë", "Bob"]);
}
